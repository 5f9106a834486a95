//! Evaluation of `time_scheduled` rules.

use std::time::Duration;

use chrono::Utc;
use stageflow_pipeline::AutomationEngine;
use tokio_util::sync::CancellationToken;

/// Tick scheduled rules over consecutive windows `(previous tick, now]`.
///
/// The first window opens when the loop starts, so occurrences from before
/// the worker was running are not replayed. A failed tick keeps its window
/// start and the next tick covers both.
pub async fn run(engine: AutomationEngine, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Schedule ticker started");
    let mut interval = tokio::time::interval(period);
    let mut window_start = Utc::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Schedule ticker stopping");
                break;
            }
            _ = interval.tick() => {
                let now = Utc::now();
                match engine.tick(window_start, now).await {
                    Ok(report) => {
                        if report.matched > 0 {
                            tracing::info!(
                                matched = report.matched,
                                succeeded = report.succeeded,
                                failed = report.failed,
                                "Scheduled rules fired"
                            );
                        }
                        window_start = now;
                    }
                    Err(e) => tracing::error!(error = %e, "Schedule tick failed"),
                }
            }
        }
    }
}
