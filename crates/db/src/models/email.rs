//! Email template and outgoing queue models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stageflow_core::types::{DbId, Timestamp};

/// A row from the `email_templates` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmailTemplate {
    pub id: DbId,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEmailTemplate {
    pub name: String,
    pub subject: String,
    pub body: String,
}

/// Queue status values.
pub mod email_status {
    pub const PENDING: &str = "pending";
    pub const SENT: &str = "sent";
    pub const FAILED: &str = "failed";
}

/// A row from the `email_queue` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueuedEmail {
    pub id: DbId,
    pub template_id: Option<DbId>,
    pub project_id: Option<DbId>,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub sent_at: Option<Timestamp>,
}

/// DTO for a rendered email waiting to be sent.
#[derive(Debug, Clone)]
pub struct NewQueuedEmail {
    pub template_id: Option<DbId>,
    pub project_id: Option<DbId>,
    pub to_email: String,
    pub subject: String,
    pub body: String,
}
