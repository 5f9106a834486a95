//! Stage history entity model.

use serde::Serialize;
use sqlx::FromRow;
use stageflow_core::types::{DbId, StageNumber, Timestamp};

/// A row from the append-only `stage_history` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct StageHistory {
    pub id: DbId,
    pub project_id: DbId,
    /// `None` only on the creation entry.
    pub from_stage: Option<String>,
    pub to_stage: String,
    pub from_stage_number: Option<StageNumber>,
    pub to_stage_number: StageNumber,
    pub changed_by: Option<DbId>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
}
