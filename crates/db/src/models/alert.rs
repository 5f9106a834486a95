//! Project alert model and DTO.

use serde::Serialize;
use sqlx::FromRow;
use stageflow_core::alerts::AlertCandidate;
use stageflow_core::types::{DbId, Timestamp};

/// A row from the `project_alerts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectAlert {
    pub id: DbId,
    pub project_id: DbId,
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    pub is_resolved: bool,
    pub resolved_at: Option<Timestamp>,
    pub resolved_by: Option<DbId>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub project_id: DbId,
    pub alert_type: String,
    pub severity: String,
    pub message: String,
}

impl From<&AlertCandidate> for NewAlert {
    fn from(c: &AlertCandidate) -> Self {
        Self {
            project_id: c.project_id,
            alert_type: c.alert_type.as_str().to_string(),
            severity: c.severity.as_str().to_string(),
            message: c.message.clone(),
        }
    }
}
