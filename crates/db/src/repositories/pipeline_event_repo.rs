//! Repository for the `pipeline_events` outbox.
//!
//! Rows are appended by [`ProjectRepo`](super::ProjectRepo) transactions and
//! drained here by the relay.

use sqlx::PgPool;
use stageflow_core::types::DbId;

use crate::models::pipeline_event::PipelineEventRow;

const COLUMNS: &str =
    "id, project_id, event_type, payload, actor_user_id, cascade_depth, created_at, processed_at";

pub struct PipelineEventRepo;

impl PipelineEventRepo {
    /// Oldest unprocessed events, in commit order.
    pub async fn list_unprocessed(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<PipelineEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pipeline_events
             WHERE processed_at IS NULL
             ORDER BY id ASC
             LIMIT $1"
        );
        sqlx::query_as::<_, PipelineEventRow>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<PipelineEventRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pipeline_events WHERE id = $1");
        sqlx::query_as::<_, PipelineEventRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark an event processed. Returns `false` if it already was.
    pub async fn mark_processed(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pipeline_events SET processed_at = NOW()
             WHERE id = $1 AND processed_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
