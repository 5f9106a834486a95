//! Drains the `pipeline_events` outbox.
//!
//! Catches every change the bus listener missed: events written by other
//! processes, events dropped while the listener lagged, and events committed
//! before this worker started.

use std::time::Duration;

use chrono::Utc;
use stageflow_pipeline::OutboxRelay;
use tokio_util::sync::CancellationToken;

pub async fn run(relay: OutboxRelay, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Outbox relay started");
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Outbox relay stopping");
                break;
            }
            _ = interval.tick() => {
                match relay.drain_until_idle(Utc::now()).await {
                    Ok(report) if report.processed > 0 || report.failed_decode > 0 => {
                        tracing::info!(
                            processed = report.processed,
                            failed_decode = report.failed_decode,
                            succeeded = report.evaluation.succeeded,
                            failed = report.evaluation.failed,
                            "Outbox drained"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Outbox drain failed"),
                }
            }
        }
    }
}
