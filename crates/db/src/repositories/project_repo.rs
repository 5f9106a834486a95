//! Repository for the `projects` table.
//!
//! Stage and payment writes are transactional: the project row, its history
//! entry, and the outbox event commit together or not at all.

use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use stageflow_core::evaluation::Change;
use stageflow_core::stages;
use stageflow_core::transition::TransitionPlan;
use stageflow_core::types::{Cents, DbId};

use crate::models::project::{
    CommittedTransition, CreateProject, CreatedProject, Project, ProjectSnapshot, RecordedPayment,
};
use crate::models::stage_history::StageHistory;
use crate::repositories::stage_history_repo::COLUMNS as HISTORY_COLUMNS;

const COLUMNS: &str = "id, title, description, client_id, current_stage, stage_number, \
     budget_cents, paid_cents, notes, start_date, deadline, completion_date, assigned_to, \
     created_by, created_at, updated_at";

/// Snapshot select: project, client name, and the latest history entry.
const SNAPSHOT_SELECT: &str = "SELECT p.id, p.title, p.client_id, c.name AS client_name, \
        p.current_stage, p.stage_number, p.budget_cents, p.paid_cents, p.assigned_to, \
        p.created_by, p.notes, p.start_date, p.deadline, p.completion_date, \
        h.id AS last_history_id, h.created_at AS stage_entered_at, p.created_at \
     FROM projects p \
     LEFT JOIN clients c ON c.id = p.client_id \
     JOIN LATERAL ( \
        SELECT id, created_at FROM stage_history \
        WHERE project_id = p.id ORDER BY id DESC LIMIT 1 \
     ) h ON TRUE";

/// Parameters of one stage commit.
#[derive(Debug, Clone)]
pub struct StageCommit<'a> {
    pub project_id: DbId,
    pub plan: &'a TransitionPlan,
    pub changed_by: Option<DbId>,
    pub notes: Option<&'a str>,
    pub cascade_depth: i16,
    /// Date recorded as `completion_date` when the plan completes the project.
    pub today: NaiveDate,
}

pub struct ProjectRepo;

impl ProjectRepo {
    // ---- Creation ----

    /// Insert a project in the initial stage together with its creation
    /// history entry and a `project_created` outbox event.
    pub async fn create_with_history(
        pool: &PgPool,
        input: &CreateProject,
    ) -> Result<CreatedProject, sqlx::Error> {
        let initial = stages::initial_stage();
        let mut tx = pool.begin().await?;

        let insert = format!(
            "INSERT INTO projects
                (title, description, client_id, current_stage, stage_number, budget_cents,
                 notes, start_date, deadline, assigned_to, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {COLUMNS}"
        );
        let project = sqlx::query_as::<_, Project>(&insert)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.client_id)
            .bind(initial.name)
            .bind(initial.number)
            .bind(input.budget_cents)
            .bind(&input.notes)
            .bind(input.start_date)
            .bind(input.deadline)
            .bind(input.assigned_to)
            .bind(input.created_by)
            .fetch_one(&mut *tx)
            .await?;

        let history = Self::insert_history(
            &mut tx,
            project.id,
            None,
            initial.name,
            initial.number,
            input.created_by,
            None,
        )
        .await?;

        let event_id = Self::insert_event(
            &mut tx,
            project.id,
            &Change::ProjectCreated {
                history_id: history.id,
            },
            input.created_by,
            0,
        )
        .await?;

        tx.commit().await?;
        Ok(CreatedProject {
            project,
            history,
            event_id,
        })
    }

    // ---- Reads ----

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_client(
        pool: &PgPool,
        client_id: DbId,
    ) -> Result<Vec<Project>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM projects WHERE client_id = $1 ORDER BY created_at DESC");
        sqlx::query_as::<_, Project>(&query)
            .bind(client_id)
            .fetch_all(pool)
            .await
    }

    pub async fn snapshot(pool: &PgPool, id: DbId) -> Result<Option<ProjectSnapshot>, sqlx::Error> {
        let query = format!("{SNAPSHOT_SELECT} WHERE p.id = $1");
        sqlx::query_as::<_, ProjectSnapshot>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Snapshots of every project, optionally excluding completed ones.
    pub async fn list_snapshots(
        pool: &PgPool,
        include_completed: bool,
    ) -> Result<Vec<ProjectSnapshot>, sqlx::Error> {
        let filter = if include_completed {
            ""
        } else {
            "WHERE p.stage_number <> 18"
        };
        let query = format!("{SNAPSHOT_SELECT} {filter} ORDER BY p.id");
        sqlx::query_as::<_, ProjectSnapshot>(&query)
            .fetch_all(pool)
            .await
    }

    pub async fn list_snapshots_by_client(
        pool: &PgPool,
        client_id: DbId,
    ) -> Result<Vec<ProjectSnapshot>, sqlx::Error> {
        let query = format!("{SNAPSHOT_SELECT} WHERE p.client_id = $1 ORDER BY p.id");
        sqlx::query_as::<_, ProjectSnapshot>(&query)
            .bind(client_id)
            .fetch_all(pool)
            .await
    }

    // ---- Stage transitions ----

    /// Commit a validated transition.
    ///
    /// The update only applies while the project is still at
    /// `plan.from.number`; if another writer moved it first, nothing is
    /// written and `None` is returned.
    pub async fn apply_transition(
        pool: &PgPool,
        commit: &StageCommit<'_>,
    ) -> Result<Option<CommittedTransition>, sqlx::Error> {
        let plan = commit.plan;
        let touch_completion = plan.completes_project() || plan.reopens_project();
        let completion_date = plan.completes_project().then_some(commit.today);

        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE projects SET
                current_stage = $2,
                stage_number = $3,
                completion_date = CASE WHEN $5 THEN $6 ELSE completion_date END,
                updated_at = NOW()
             WHERE id = $1 AND stage_number = $4",
        )
        .bind(commit.project_id)
        .bind(plan.to.name)
        .bind(plan.to.number)
        .bind(plan.from.number)
        .bind(touch_completion)
        .bind(completion_date)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let history = Self::insert_history(
            &mut tx,
            commit.project_id,
            Some((plan.from.name, plan.from.number)),
            plan.to.name,
            plan.to.number,
            commit.changed_by,
            commit.notes,
        )
        .await?;

        let event_id = Self::insert_event(
            &mut tx,
            commit.project_id,
            &Change::StageEntered {
                history_id: history.id,
                from_stage: Some(plan.from.number),
                to_stage: plan.to.number,
            },
            commit.changed_by,
            commit.cascade_depth,
        )
        .await?;

        tx.commit().await?;
        Ok(Some(CommittedTransition { history, event_id }))
    }

    // ---- Payments ----

    /// Add `amount_cents` to the paid total and emit a `payment_recorded`
    /// event. Returns `None` if the project does not exist.
    pub async fn record_payment(
        pool: &PgPool,
        project_id: DbId,
        amount_cents: Cents,
        recorded_by: Option<DbId>,
    ) -> Result<Option<RecordedPayment>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let previous: Option<Cents> =
            sqlx::query_scalar("SELECT paid_cents FROM projects WHERE id = $1 FOR UPDATE")
                .bind(project_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(previous_paid_cents) = previous else {
            tx.rollback().await?;
            return Ok(None);
        };

        let (paid_cents, budget_cents): (Cents, Option<Cents>) = sqlx::query_as(
            "UPDATE projects SET paid_cents = paid_cents + $2, updated_at = NOW()
             WHERE id = $1
             RETURNING paid_cents, budget_cents",
        )
        .bind(project_id)
        .bind(amount_cents)
        .fetch_one(&mut *tx)
        .await?;

        let event_id = Self::insert_event(
            &mut tx,
            project_id,
            &Change::PaymentRecorded {
                previous_paid_cents,
                paid_cents,
                budget_cents,
            },
            recorded_by,
            0,
        )
        .await?;

        tx.commit().await?;
        Ok(Some(RecordedPayment {
            previous_paid_cents,
            paid_cents,
            budget_cents,
            event_id,
        }))
    }

    // ---- Plain field edits ----

    pub async fn set_assignee(
        pool: &PgPool,
        project_id: DbId,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET assigned_to = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(project_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- Transaction helpers ----

    async fn insert_history(
        tx: &mut Transaction<'_, Postgres>,
        project_id: DbId,
        from: Option<(&str, i16)>,
        to_stage: &str,
        to_stage_number: i16,
        changed_by: Option<DbId>,
        notes: Option<&str>,
    ) -> Result<StageHistory, sqlx::Error> {
        let query = format!(
            "INSERT INTO stage_history
                (project_id, from_stage, to_stage, from_stage_number, to_stage_number, changed_by, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {HISTORY_COLUMNS}"
        );
        sqlx::query_as::<_, StageHistory>(&query)
            .bind(project_id)
            .bind(from.map(|(name, _)| name))
            .bind(to_stage)
            .bind(from.map(|(_, number)| number))
            .bind(to_stage_number)
            .bind(changed_by)
            .bind(notes)
            .fetch_one(&mut **tx)
            .await
    }

    async fn insert_event(
        tx: &mut Transaction<'_, Postgres>,
        project_id: DbId,
        change: &Change,
        actor_user_id: Option<DbId>,
        cascade_depth: i16,
    ) -> Result<DbId, sqlx::Error> {
        let payload =
            serde_json::to_value(change).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query_scalar(
            "INSERT INTO pipeline_events (project_id, event_type, payload, actor_user_id, cascade_depth)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(project_id)
        .bind(change.kind())
        .bind(payload)
        .bind(actor_user_id)
        .bind(cascade_depth)
        .fetch_one(&mut **tx)
        .await
    }
}
