//! Repository for the `user_preferences` table.

use sqlx::PgPool;
use stageflow_core::notifications::UserPreferences;
use stageflow_core::types::DbId;

use crate::models::preferences::UserPreferenceRow;

const COLUMNS: &str = "user_id, preferences, updated_at";

pub struct UserPreferenceRepo;

impl UserPreferenceRepo {
    pub async fn find(pool: &PgPool, user_id: DbId) -> Result<Option<UserPreferenceRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_preferences WHERE user_id = $1");
        sqlx::query_as::<_, UserPreferenceRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Preferences for a user, defaults when none are stored.
    pub async fn get_or_default(pool: &PgPool, user_id: DbId) -> Result<UserPreferences, sqlx::Error> {
        Ok(Self::find(pool, user_id)
            .await?
            .map(|row| row.parsed())
            .unwrap_or_default())
    }

    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        prefs: &UserPreferences,
    ) -> Result<UserPreferenceRow, sqlx::Error> {
        let doc = serde_json::to_value(prefs).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let query = format!(
            "INSERT INTO user_preferences (user_id, preferences)
             VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET preferences = EXCLUDED.preferences, updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserPreferenceRow>(&query)
            .bind(user_id)
            .bind(doc)
            .fetch_one(pool)
            .await
    }
}
