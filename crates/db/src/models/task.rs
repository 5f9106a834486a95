//! Project task, reminder, and invoice models.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;
use stageflow_core::types::{Cents, DbId, Timestamp};

/// Values of `project_tasks.kind`.
pub mod task_kinds {
    pub const TASK: &str = "task";
    pub const REMINDER: &str = "reminder";
    pub const INVOICE: &str = "invoice";
}

/// A row from the `project_tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectTask {
    pub id: DbId,
    pub project_id: DbId,
    pub kind: String,
    pub title: String,
    pub description: Option<String>,
    pub amount_cents: Option<Cents>,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<DbId>,
    pub created_by_rule_id: Option<DbId>,
    pub is_done: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: DbId,
    pub kind: &'static str,
    pub title: String,
    pub description: Option<String>,
    pub amount_cents: Option<Cents>,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<DbId>,
    pub created_by_rule_id: Option<DbId>,
}
