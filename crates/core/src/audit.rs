//! Audit log vocabulary and the entry shape handed to the audit sink.

use serde::Serialize;
use serde_json::Value;

use crate::stages::Stage;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Action type constants
// ---------------------------------------------------------------------------

/// Known action types for audit log entries.
pub mod action_types {
    pub const PROJECT_CREATED: &str = "project_created";
    pub const PROJECT_UPDATED: &str = "project_updated";
    pub const PROJECT_DELETED: &str = "project_deleted";
    pub const STAGE_CHANGED: &str = "stage_changed";
    pub const CLIENT_CREATED: &str = "client_created";
    pub const CLIENT_UPDATED: &str = "client_updated";
    pub const CLIENT_DELETED: &str = "client_deleted";
    pub const PAYMENT_RECORDED: &str = "payment_recorded";
    pub const AUTOMATION_TRIGGERED: &str = "automation_triggered";
    pub const SETTINGS_CHANGED: &str = "settings_changed";
}

// ---------------------------------------------------------------------------
// Entity type constants
// ---------------------------------------------------------------------------

/// Known entity types for audit log entries.
pub mod entity_types {
    pub const PROJECT: &str = "project";
    pub const CLIENT: &str = "client";
    pub const USER: &str = "user";
    pub const AUTOMATION: &str = "automation";
    pub const SYSTEM: &str = "system";
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One who-did-what record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub user_id: Option<DbId>,
    pub action_type: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<DbId>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
}

impl AuditEntry {
    pub fn new(action_type: &'static str, entity_type: &'static str) -> Self {
        Self {
            user_id: None,
            action_type,
            entity_type,
            entity_id: None,
            old_values: None,
            new_values: None,
        }
    }

    pub fn by(mut self, user_id: Option<DbId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn on(mut self, entity_id: DbId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_old(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn with_new(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }

    /// Entry for a committed stage change.
    pub fn stage_changed(
        project_id: DbId,
        user_id: Option<DbId>,
        from: &Stage,
        to: &Stage,
    ) -> Self {
        Self::new(action_types::STAGE_CHANGED, entity_types::PROJECT)
            .by(user_id)
            .on(project_id)
            .with_old(stage_values(from))
            .with_new(stage_values(to))
    }
}

fn stage_values(stage: &Stage) -> Value {
    serde_json::json!({
        "current_stage": stage.name,
        "stage_number": stage.number,
    })
}
