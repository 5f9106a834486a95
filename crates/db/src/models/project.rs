//! Project entity model, DTOs, and the snapshot read used by the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stageflow_core::project::ProjectState;
use stageflow_core::types::{Cents, DbId, StageNumber, Timestamp};

use crate::models::stage_history::StageHistory;

/// A row from the `projects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<DbId>,
    pub current_stage: String,
    pub stage_number: StageNumber,
    pub budget_cents: Option<Cents>,
    pub paid_cents: Cents,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub assigned_to: Option<DbId>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a project. New projects always start in stage 1.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProject {
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<DbId>,
    pub budget_cents: Option<Cents>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub assigned_to: Option<DbId>,
    pub created_by: Option<DbId>,
}

/// Project joined with its client name and latest history entry.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectSnapshot {
    pub id: DbId,
    pub title: String,
    pub client_id: Option<DbId>,
    pub client_name: Option<String>,
    pub current_stage: String,
    pub stage_number: StageNumber,
    pub budget_cents: Option<Cents>,
    pub paid_cents: Cents,
    pub assigned_to: Option<DbId>,
    pub created_by: Option<DbId>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub last_history_id: DbId,
    pub stage_entered_at: Timestamp,
    pub created_at: Timestamp,
}

impl From<ProjectSnapshot> for ProjectState {
    fn from(s: ProjectSnapshot) -> Self {
        ProjectState {
            id: s.id,
            title: s.title,
            client_id: s.client_id,
            client_name: s.client_name,
            current_stage: s.current_stage,
            stage_number: s.stage_number,
            budget_cents: s.budget_cents,
            paid_cents: s.paid_cents,
            assigned_to: s.assigned_to,
            created_by: s.created_by,
            notes: s.notes,
            start_date: s.start_date,
            deadline: s.deadline,
            completion_date: s.completion_date,
            last_history_id: s.last_history_id,
            stage_entered_at: s.stage_entered_at,
            created_at: s.created_at,
        }
    }
}

/// Result of the creation transaction.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedProject {
    pub project: Project,
    pub history: StageHistory,
    pub event_id: DbId,
}

/// Result of a committed stage transition.
#[derive(Debug, Clone, Serialize)]
pub struct CommittedTransition {
    pub history: StageHistory,
    pub event_id: DbId,
}

/// Result of the payment transaction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RecordedPayment {
    pub previous_paid_cents: Cents,
    pub paid_cents: Cents,
    pub budget_cents: Option<Cents>,
    pub event_id: DbId,
}
