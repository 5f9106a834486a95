//! Repository for the outgoing `email_queue`.

use sqlx::PgPool;
use stageflow_core::types::DbId;

use crate::models::email::{email_status, NewQueuedEmail, QueuedEmail};

const COLUMNS: &str = "id, template_id, project_id, to_email, subject, body, status, attempts, \
     last_error, created_at, sent_at";

pub struct EmailQueueRepo;

impl EmailQueueRepo {
    pub async fn enqueue(pool: &PgPool, input: &NewQueuedEmail) -> Result<QueuedEmail, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_queue (template_id, project_id, to_email, subject, body)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueuedEmail>(&query)
            .bind(input.template_id)
            .bind(input.project_id)
            .bind(&input.to_email)
            .bind(&input.subject)
            .bind(&input.body)
            .fetch_one(pool)
            .await
    }

    pub async fn list_pending(pool: &PgPool, limit: i64) -> Result<Vec<QueuedEmail>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM email_queue WHERE status = $1 ORDER BY id ASC LIMIT $2"
        );
        sqlx::query_as::<_, QueuedEmail>(&query)
            .bind(email_status::PENDING)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn mark_sent(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE email_queue SET status = $2, sent_at = NOW(), attempts = attempts + 1
             WHERE id = $1",
        )
        .bind(id)
        .bind(email_status::SENT)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt. The row stays pending until `max_attempts`
    /// is reached, then moves to `failed`.
    pub async fn mark_attempt_failed(
        pool: &PgPool,
        id: DbId,
        error: &str,
        max_attempts: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE email_queue SET
                attempts = attempts + 1,
                last_error = $2,
                status = CASE WHEN attempts + 1 >= $3 THEN $4 ELSE status END
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(max_attempts)
        .bind(email_status::FAILED)
        .execute(pool)
        .await?;
        Ok(())
    }
}
