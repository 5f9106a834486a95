//! Outbox row model for the `pipeline_events` table.

use serde::Serialize;
use sqlx::FromRow;
use stageflow_core::types::{DbId, Timestamp};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PipelineEventRow {
    pub id: DbId,
    pub project_id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub actor_user_id: Option<DbId>,
    pub cascade_depth: i16,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}
