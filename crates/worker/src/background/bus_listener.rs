//! Immediate evaluation of events published on the in-process bus.

use chrono::Utc;
use stageflow_events::PipelineEvent;
use stageflow_pipeline::AutomationEngine;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Evaluate every received event until cancelled or the bus closes.
///
/// Lagged events are left to the outbox relay, which sees the same rows.
pub async fn run(
    engine: AutomationEngine,
    mut receiver: broadcast::Receiver<PipelineEvent>,
    cancel: CancellationToken,
) {
    tracing::info!("Bus listener started");
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Bus listener stopping");
                break;
            }
            received = receiver.recv() => received,
        };

        match received {
            Ok(event) => {
                if let Err(e) = engine.process_event(&event, Utc::now()).await {
                    tracing::error!(
                        event_id = event.id,
                        project_id = event.project_id,
                        error = %e,
                        "Bus event evaluation failed, the outbox relay will retry"
                    );
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Bus listener lagged, relay will catch up");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event bus closed, bus listener shutting down");
                break;
            }
        }
    }
}
