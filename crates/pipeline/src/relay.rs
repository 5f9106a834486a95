//! Outbox relay: evaluates committed changes that were written to
//! `pipeline_events` but not yet processed.

use serde::Serialize;
use stageflow_core::types::Timestamp;
use stageflow_events::PipelineEvent;

use crate::engine::{AutomationEngine, EvaluationReport};
use crate::error::PipelineError;
use crate::store::PipelineContext;

/// Default number of outbox rows drained per batch.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Upper bound on batches in one [`OutboxRelay::drain_until_idle`] call.
const MAX_BATCHES_PER_DRAIN: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub processed: usize,
    /// Rows whose payload could not be decoded. They are marked processed
    /// so they do not block the outbox.
    pub failed_decode: usize,
    pub evaluation: EvaluationReport,
}

impl RelayReport {
    fn merge(&mut self, other: RelayReport) {
        self.processed += other.processed;
        self.failed_decode += other.failed_decode;
        self.evaluation.merge(other.evaluation);
    }

    fn is_empty(&self) -> bool {
        self.processed == 0 && self.failed_decode == 0
    }
}

#[derive(Clone)]
pub struct OutboxRelay {
    ctx: PipelineContext,
    engine: AutomationEngine,
    batch_size: i64,
}

impl OutboxRelay {
    pub fn new(ctx: PipelineContext, engine: AutomationEngine, batch_size: i64) -> Self {
        Self {
            ctx,
            engine,
            batch_size: batch_size.max(1),
        }
    }

    /// Evaluate one batch of unprocessed rows in id order.
    ///
    /// A store failure during evaluation stops the batch and leaves the
    /// failing row unprocessed for the next drain.
    pub async fn drain(&self, now: Timestamp) -> Result<RelayReport, PipelineError> {
        let rows = self.ctx.store.unprocessed_events(self.batch_size).await?;
        let mut report = RelayReport::default();

        for row in &rows {
            let event = match PipelineEvent::try_from(row) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(event_id = row.id, error = %e, "Dropping undecodable outbox event");
                    self.ctx.store.mark_event_processed(row.id).await?;
                    report.failed_decode += 1;
                    continue;
                }
            };

            let evaluation = self.engine.process_event(&event, now).await?;
            self.ctx.store.mark_event_processed(row.id).await?;
            report.processed += 1;
            report.evaluation.merge(evaluation);
        }

        if !report.is_empty() {
            tracing::debug!(
                processed = report.processed,
                failed_decode = report.failed_decode,
                matched = report.evaluation.matched,
                "Outbox batch drained"
            );
        }
        Ok(report)
    }

    /// Drain batches until the outbox is empty, including events written by
    /// rule-driven moves during the drain itself.
    pub async fn drain_until_idle(&self, now: Timestamp) -> Result<RelayReport, PipelineError> {
        let mut total = RelayReport::default();
        for _ in 0..MAX_BATCHES_PER_DRAIN {
            let batch = self.drain(now).await?;
            if batch.is_empty() {
                break;
            }
            total.merge(batch);
        }
        Ok(total)
    }
}
