//! Repository for the `automation_executions` log.

use sqlx::PgPool;
use stageflow_core::types::{DbId, Timestamp};

use crate::models::automation::{AutomationExecution, NewExecution};

const COLUMNS: &str =
    "id, rule_id, project_id, dedup_key, status, dry_run, details, error_message, executed_at";

pub struct AutomationExecutionRepo;

impl AutomationExecutionRepo {
    pub async fn create(
        pool: &PgPool,
        input: &NewExecution,
    ) -> Result<AutomationExecution, sqlx::Error> {
        let query = format!(
            "INSERT INTO automation_executions
                (rule_id, project_id, dedup_key, status, dry_run, details, error_message)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AutomationExecution>(&query)
            .bind(input.rule_id)
            .bind(input.project_id)
            .bind(&input.dedup_key)
            .bind(&input.status)
            .bind(input.dry_run)
            .bind(&input.details)
            .bind(&input.error_message)
            .fetch_one(pool)
            .await
    }

    /// Most recent executions of a rule first.
    pub async fn list_for_rule(
        pool: &PgPool,
        rule_id: DbId,
        limit: i64,
    ) -> Result<Vec<AutomationExecution>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automation_executions
             WHERE rule_id = $1
             ORDER BY executed_at DESC, id DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, AutomationExecution>(&query)
            .bind(rule_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn count_since(pool: &PgPool, since: Timestamp) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM automation_executions WHERE executed_at >= $1")
            .bind(since)
            .fetch_one(pool)
            .await
    }
}
