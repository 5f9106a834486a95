//! Repository for the `email_templates` table.

use sqlx::PgPool;
use stageflow_core::types::DbId;

use crate::models::email::{CreateEmailTemplate, EmailTemplate};

const COLUMNS: &str = "id, name, subject, body, is_active, created_at, updated_at";

pub struct EmailTemplateRepo;

impl EmailTemplateRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateEmailTemplate,
    ) -> Result<EmailTemplate, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_templates (name, subject, body)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(&input.name)
            .bind(&input.subject)
            .bind(&input.body)
            .fetch_one(pool)
            .await
    }

    /// An active template by id; inactive templates are not usable.
    pub async fn find_active(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<EmailTemplate>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM email_templates WHERE id = $1 AND is_active");
        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
