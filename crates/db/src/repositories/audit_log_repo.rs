//! Repository for the `audit_logs` table.

use sqlx::PgPool;
use stageflow_core::audit::AuditEntry;
use stageflow_core::types::DbId;

use crate::models::audit::AuditLog;

const COLUMNS: &str =
    "id, user_id, action_type, entity_type, entity_id, old_values, new_values, created_at";

pub struct AuditLogRepo;

impl AuditLogRepo {
    pub async fn create(pool: &PgPool, entry: &AuditEntry) -> Result<AuditLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_logs (user_id, action_type, entity_type, entity_id, old_values, new_values)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(entry.user_id)
            .bind(entry.action_type)
            .bind(entry.entity_type)
            .bind(entry.entity_id)
            .bind(&entry.old_values)
            .bind(&entry.new_values)
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_entity(
        pool: &PgPool,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_logs
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_all(pool)
            .await
    }
}
