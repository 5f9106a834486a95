//! Repository for the `project_alerts` table.

use sqlx::PgPool;
use stageflow_core::types::DbId;

use crate::models::alert::{NewAlert, ProjectAlert};

const COLUMNS: &str = "id, project_id, alert_type, severity, message, is_resolved, resolved_at, \
     resolved_by, created_at";

pub struct ProjectAlertRepo;

impl ProjectAlertRepo {
    /// Open an alert unless an unresolved one of the same type already
    /// exists for the project. Returns `None` when skipped.
    ///
    /// `custom` alerts are never deduplicated.
    pub async fn create_if_absent(
        pool: &PgPool,
        input: &NewAlert,
    ) -> Result<Option<ProjectAlert>, sqlx::Error> {
        let query = format!(
            "INSERT INTO project_alerts (project_id, alert_type, severity, message)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (project_id, alert_type) WHERE NOT is_resolved AND alert_type <> 'custom'
             DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectAlert>(&query)
            .bind(input.project_id)
            .bind(&input.alert_type)
            .bind(&input.severity)
            .bind(&input.message)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_open_for_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Vec<ProjectAlert>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM project_alerts
             WHERE project_id = $1 AND NOT is_resolved
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, ProjectAlert>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Resolve an open alert. Returns `None` if it does not exist or is
    /// already resolved.
    pub async fn resolve(
        pool: &PgPool,
        id: DbId,
        resolved_by: Option<DbId>,
    ) -> Result<Option<ProjectAlert>, sqlx::Error> {
        let query = format!(
            "UPDATE project_alerts
             SET is_resolved = TRUE, resolved_at = NOW(), resolved_by = $2
             WHERE id = $1 AND NOT is_resolved
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectAlert>(&query)
            .bind(id)
            .bind(resolved_by)
            .fetch_optional(pool)
            .await
    }

    pub async fn count_open(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM project_alerts WHERE NOT is_resolved")
            .fetch_one(pool)
            .await
    }
}
