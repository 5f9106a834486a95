//! Repository for the `project_tasks` table.

use sqlx::PgPool;
use stageflow_core::types::DbId;

use crate::models::task::{NewTask, ProjectTask};

const COLUMNS: &str = "id, project_id, kind, title, description, amount_cents, due_date, \
     assigned_to, created_by_rule_id, is_done, created_at";

pub struct ProjectTaskRepo;

impl ProjectTaskRepo {
    pub async fn create(pool: &PgPool, input: &NewTask) -> Result<ProjectTask, sqlx::Error> {
        let query = format!(
            "INSERT INTO project_tasks
                (project_id, kind, title, description, amount_cents, due_date, assigned_to,
                 created_by_rule_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectTask>(&query)
            .bind(input.project_id)
            .bind(input.kind)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.amount_cents)
            .bind(input.due_date)
            .bind(input.assigned_to)
            .bind(input.created_by_rule_id)
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Vec<ProjectTask>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM project_tasks WHERE project_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, ProjectTask>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }
}
