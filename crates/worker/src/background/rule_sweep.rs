//! Periodic re-check of level triggers (`stage_duration`, `condition_met`).

use std::time::Duration;

use chrono::Utc;
use stageflow_pipeline::AutomationEngine;
use tokio_util::sync::CancellationToken;

pub async fn run(engine: AutomationEngine, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Rule sweep started");
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Rule sweep stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = engine.sweep(Utc::now()).await {
                    tracing::error!(error = %e, "Rule sweep failed");
                }
            }
        }
    }
}
