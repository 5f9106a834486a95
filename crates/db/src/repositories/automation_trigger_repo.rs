//! Claims on rule satisfaction events (`automation_triggers`).

use sqlx::PgPool;
use stageflow_core::types::DbId;

pub struct AutomationTriggerRepo;

impl AutomationTriggerRepo {
    /// Claim `(rule_id, dedup_key)`. Returns `true` only for the first
    /// caller; every later claim of the same pair returns `false`.
    pub async fn claim(
        pool: &PgPool,
        rule_id: DbId,
        dedup_key: &str,
        project_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO automation_triggers (rule_id, dedup_key, project_id)
             VALUES ($1, $2, $3)
             ON CONFLICT (rule_id, dedup_key) DO NOTHING",
        )
        .bind(rule_id)
        .bind(dedup_key)
        .bind(project_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Remove a claim so the same satisfaction event can be fired again.
    pub async fn release(
        pool: &PgPool,
        rule_id: DbId,
        dedup_key: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM automation_triggers WHERE rule_id = $1 AND dedup_key = $2")
                .bind(rule_id)
                .bind(dedup_key)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}
