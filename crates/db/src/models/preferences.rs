//! Per-user preference row. The JSON column deserializes into
//! [`UserPreferences`], missing keys taking their defaults.

use serde::Serialize;
use sqlx::FromRow;
use stageflow_core::notifications::UserPreferences;
use stageflow_core::types::{DbId, Timestamp};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserPreferenceRow {
    pub user_id: DbId,
    pub preferences: serde_json::Value,
    pub updated_at: Timestamp,
}

impl UserPreferenceRow {
    /// Typed preferences. A malformed document falls back to the defaults.
    pub fn parsed(&self) -> UserPreferences {
        serde_json::from_value(self.preferences.clone()).unwrap_or_else(|e| {
            tracing::warn!(user_id = self.user_id, error = %e, "Malformed user preferences, using defaults");
            UserPreferences::default()
        })
    }
}
