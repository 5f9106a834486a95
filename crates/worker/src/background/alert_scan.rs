//! Periodic smart-detection scan.

use std::time::Duration;

use chrono::Utc;
use stageflow_pipeline::AlertScanner;
use tokio_util::sync::CancellationToken;

pub async fn run(scanner: AlertScanner, period: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = period.as_secs(),
        stuck_days = scanner.thresholds().stuck_days,
        "Alert scan started"
    );
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Alert scan stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = scanner.scan(Utc::now()).await {
                    tracing::error!(error = %e, "Alert scan failed");
                }
            }
        }
    }
}
