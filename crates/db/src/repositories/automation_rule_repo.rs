//! Repository for the `automation_rules` table.

use sqlx::PgPool;
use stageflow_core::types::{DbId, Timestamp};

use crate::models::automation::{AutomationRule, CreateAutomationRule};

const COLUMNS: &str = "id, name, description, trigger_type, trigger_config, action_type, \
     action_config, is_active, dry_run, created_by, last_triggered_at, created_at, updated_at";

pub struct AutomationRuleRepo;

impl AutomationRuleRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateAutomationRule,
    ) -> Result<AutomationRule, sqlx::Error> {
        let query = format!(
            "INSERT INTO automation_rules
                (name, description, trigger_type, trigger_config, action_type, action_config,
                 is_active, dry_run, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AutomationRule>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.trigger_type)
            .bind(&input.trigger_config)
            .bind(&input.action_type)
            .bind(&input.action_config)
            .bind(input.is_active)
            .bind(input.dry_run)
            .bind(input.created_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<AutomationRule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM automation_rules WHERE id = $1");
        sqlx::query_as::<_, AutomationRule>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active rules, optionally restricted to the given trigger types.
    pub async fn list_active(
        pool: &PgPool,
        trigger_types: Option<&[&str]>,
    ) -> Result<Vec<AutomationRule>, sqlx::Error> {
        match trigger_types {
            Some(types) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM automation_rules
                     WHERE is_active AND trigger_type = ANY($1)
                     ORDER BY id"
                );
                let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                sqlx::query_as::<_, AutomationRule>(&query)
                    .bind(types)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query =
                    format!("SELECT {COLUMNS} FROM automation_rules WHERE is_active ORDER BY id");
                sqlx::query_as::<_, AutomationRule>(&query)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    pub async fn set_active(pool: &PgPool, id: DbId, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE automation_rules SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_dry_run(pool: &PgPool, id: DbId, dry_run: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE automation_rules SET dry_run = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(dry_run)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_triggered(
        pool: &PgPool,
        id: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE automation_rules SET last_triggered_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM automation_rules WHERE is_active")
            .fetch_one(pool)
            .await
    }
}
