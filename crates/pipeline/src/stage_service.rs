//! Stage transitions, project creation, and payments.
//!
//! [`StageService`] runs the validator and the history recorder as one unit:
//! the request is planned and authorized against freshly read state, then
//! committed optimistically together with its history row and outbox event.
//! Human moves and rule-driven moves take the same path.

use chrono::Utc;
use serde::Serialize;
use stageflow_core::audit::{action_types, entity_types, AuditEntry};
use stageflow_core::error::CoreError;
use stageflow_core::evaluation::Change;
use stageflow_core::transition::{authorize, plan_transition, TransitionPlan};
use stageflow_core::types::{Cents, DbId, StageNumber};
use stageflow_db::models::project::{CreateProject, CreatedProject, RecordedPayment};
use stageflow_db::models::stage_history::StageHistory;
use stageflow_db::repositories::project_repo::StageCommit;
use stageflow_events::PipelineEvent;

use crate::error::PipelineError;
use crate::store::PipelineContext;

/// A request to move a project to another stage.
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    pub project_id: DbId,
    pub target_stage: StageNumber,
    /// The explicit confirmation a backward move needs.
    pub confirmed: bool,
    pub changed_by: Option<DbId>,
    pub notes: Option<String>,
    /// 0 for human requests, parent depth + 1 for rule-driven moves.
    pub cascade_depth: i16,
}

impl TransitionRequest {
    pub fn new(project_id: DbId, target_stage: StageNumber) -> Self {
        Self {
            project_id,
            target_stage,
            ..Default::default()
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    pub fn by(mut self, user_id: DbId) -> Self {
        self.changed_by = Some(user_id);
        self
    }
}

/// A committed stage change.
#[derive(Debug, Clone, Serialize)]
pub struct StageChange {
    pub plan: TransitionPlan,
    pub history: StageHistory,
    pub event_id: DbId,
}

#[derive(Clone)]
pub struct StageService {
    ctx: PipelineContext,
}

impl StageService {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    fn publish(&self, event: PipelineEvent) {
        if let Some(bus) = &self.ctx.bus {
            bus.publish(event);
        }
    }

    // ---- Creation ----

    pub async fn create_project(
        &self,
        input: &CreateProject,
    ) -> Result<CreatedProject, PipelineError> {
        if input.title.trim().is_empty() {
            return Err(CoreError::Validation("Project title must not be empty".into()).into());
        }
        if input.budget_cents.is_some_and(|b| b < 0) {
            return Err(CoreError::Validation("Budget must not be negative".into()).into());
        }

        let created = self.ctx.store.create_project(input).await?;
        let project = &created.project;
        tracing::info!(project_id = project.id, "Project created");

        self.ctx
            .audit_quietly(
                &AuditEntry::new(action_types::PROJECT_CREATED, entity_types::PROJECT)
                    .by(input.created_by)
                    .on(project.id)
                    .with_new(serde_json::json!({
                        "title": project.title,
                        "current_stage": project.current_stage,
                        "stage_number": project.stage_number,
                    })),
            )
            .await;

        self.publish(
            PipelineEvent::new(
                created.event_id,
                project.id,
                Change::ProjectCreated {
                    history_id: created.history.id,
                },
            )
            .with_actor(input.created_by),
        );
        Ok(created)
    }

    // ---- Transitions ----

    /// Validate, authorize, and commit a stage change.
    ///
    /// Out-of-range targets and no-op moves fail with a validation error and
    /// backward moves without confirmation fail with
    /// [`CoreError::ConfirmationRequired`]; nothing is written in either
    /// case. A concurrent change between read and commit surfaces as a store
    /// conflict, also without writes.
    pub async fn request_transition(
        &self,
        request: &TransitionRequest,
    ) -> Result<StageChange, PipelineError> {
        let project = self
            .ctx
            .store
            .project_state(request.project_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Project",
                id: request.project_id,
            })?;

        let plan = plan_transition(project.stage_number, request.target_stage)?;
        authorize(&plan, request.confirmed)?;

        let committed = self
            .ctx
            .store
            .commit_transition(&StageCommit {
                project_id: request.project_id,
                plan: &plan,
                changed_by: request.changed_by,
                notes: request.notes.as_deref(),
                cascade_depth: request.cascade_depth,
                today: Utc::now().date_naive(),
            })
            .await?;

        tracing::info!(
            project_id = request.project_id,
            from = plan.from.number,
            to = plan.to.number,
            direction = plan.direction.as_str(),
            cascade_depth = request.cascade_depth,
            "Stage transition committed"
        );

        self.ctx
            .audit_quietly(&AuditEntry::stage_changed(
                request.project_id,
                request.changed_by,
                plan.from,
                plan.to,
            ))
            .await;

        self.publish(
            PipelineEvent::new(
                committed.event_id,
                request.project_id,
                Change::StageEntered {
                    history_id: committed.history.id,
                    from_stage: Some(plan.from.number),
                    to_stage: plan.to.number,
                },
            )
            .with_actor(request.changed_by)
            .with_depth(request.cascade_depth),
        );

        Ok(StageChange {
            plan,
            history: committed.history,
            event_id: committed.event_id,
        })
    }

    // ---- Payments ----

    pub async fn record_payment(
        &self,
        project_id: DbId,
        amount_cents: Cents,
        recorded_by: Option<DbId>,
    ) -> Result<RecordedPayment, PipelineError> {
        if amount_cents <= 0 {
            return Err(CoreError::Validation(format!(
                "Payment amount must be positive (got {amount_cents})"
            ))
            .into());
        }

        let payment = self
            .ctx
            .store
            .record_payment(project_id, amount_cents, recorded_by)
            .await?;
        tracing::info!(
            project_id,
            amount_cents,
            paid_cents = payment.paid_cents,
            "Payment recorded"
        );

        self.ctx
            .audit_quietly(
                &AuditEntry::new(action_types::PAYMENT_RECORDED, entity_types::PROJECT)
                    .by(recorded_by)
                    .on(project_id)
                    .with_old(serde_json::json!({ "paid_cents": payment.previous_paid_cents }))
                    .with_new(serde_json::json!({ "paid_cents": payment.paid_cents })),
            )
            .await;

        self.publish(
            PipelineEvent::new(
                payment.event_id,
                project_id,
                Change::PaymentRecorded {
                    previous_paid_cents: payment.previous_paid_cents,
                    paid_cents: payment.paid_cents,
                    budget_cents: payment.budget_cents,
                },
            )
            .with_actor(recorded_by),
        );
        Ok(payment)
    }
}
