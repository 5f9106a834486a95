//! The pipeline change event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stageflow_core::evaluation::Change;
use stageflow_core::types::DbId;
use stageflow_db::models::pipeline_event::PipelineEventRow;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Event {id} has an undecodable payload: {source}")]
    Payload {
        id: DbId,
        #[source]
        source: serde_json::Error,
    },

    #[error("Event {id} is typed '{column}' but its payload is '{payload}'")]
    TypeMismatch {
        id: DbId,
        column: String,
        payload: &'static str,
    },
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// A committed change to one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Outbox row id.
    pub id: DbId,
    pub project_id: DbId,
    pub change: Change,
    pub actor_user_id: Option<DbId>,
    /// 0 for human actions, parent depth + 1 for rule-driven moves.
    pub cascade_depth: i16,
    pub occurred_at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(id: DbId, project_id: DbId, change: Change) -> Self {
        Self {
            id,
            project_id,
            change,
            actor_user_id: None,
            cascade_depth: 0,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, user_id: Option<DbId>) -> Self {
        self.actor_user_id = user_id;
        self
    }

    pub fn with_depth(mut self, depth: i16) -> Self {
        self.cascade_depth = depth;
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.change.kind()
    }
}

impl TryFrom<&PipelineEventRow> for PipelineEvent {
    type Error = EventDecodeError;

    fn try_from(row: &PipelineEventRow) -> Result<Self, Self::Error> {
        let change: Change =
            serde_json::from_value(row.payload.clone()).map_err(|source| {
                EventDecodeError::Payload { id: row.id, source }
            })?;
        if change.kind() != row.event_type {
            return Err(EventDecodeError::TypeMismatch {
                id: row.id,
                column: row.event_type.clone(),
                payload: change.kind(),
            });
        }
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            change,
            actor_user_id: row.actor_user_id,
            cascade_depth: row.cascade_depth,
            occurred_at: row.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
