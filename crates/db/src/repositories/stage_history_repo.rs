//! Read access to the append-only `stage_history` table.
//!
//! Rows are only ever written by [`ProjectRepo`](super::ProjectRepo) inside
//! the creation and transition transactions.

use sqlx::PgPool;
use stageflow_core::types::DbId;

use crate::models::stage_history::StageHistory;

pub(crate) const COLUMNS: &str = "id, project_id, from_stage, to_stage, from_stage_number, \
     to_stage_number, changed_by, notes, created_at";

pub struct StageHistoryRepo;

impl StageHistoryRepo {
    /// The project's transition trail, oldest first.
    pub async fn list_for_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Vec<StageHistory>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM stage_history WHERE project_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, StageHistory>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    pub async fn latest_for_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Option<StageHistory>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM stage_history WHERE project_id = $1 ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, StageHistory>(&query)
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }
}
