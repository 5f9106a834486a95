//! In-app notification model and DTO.

use serde::Serialize;
use sqlx::FromRow;
use stageflow_core::types::{DbId, Timestamp};

/// A row from the `notifications` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: DbId,
    pub user_id: DbId,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub related_project_id: Option<DbId>,
    pub is_read: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: DbId,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub related_project_id: Option<DbId>,
}
