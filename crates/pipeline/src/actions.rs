//! Action handlers invoked when a live rule fires.
//!
//! Each handler returns a JSON `details` value for the execution log, or an
//! [`ActionError`] which the engine records as a failed execution. Nothing
//! here retries.

use chrono::Duration;
use serde_json::{json, Value};
use stageflow_core::alerts::AlertType;
use stageflow_core::audit::{action_types, entity_types, AuditEntry};
use stageflow_core::automation::{
    Action, AssignTeamConfig, CreateReminderConfig, CreateTaskConfig, FlagProjectConfig,
    GenerateInvoiceConfig, MoveStageConfig, SendEmailConfig, SendNotificationConfig, Trigger,
};
use stageflow_core::notifications::{check_delivery, NotificationType};
use stageflow_core::project::{format_cents, ProjectState};
use stageflow_core::templates::{render, TemplateContext};
use stageflow_core::transition::{classify, Direction};
use stageflow_core::types::{DbId, StageNumber, Timestamp};
use stageflow_db::models::alert::NewAlert;
use stageflow_db::models::email::NewQueuedEmail;
use stageflow_db::models::notification::NewNotification;
use stageflow_db::models::task::{task_kinds, NewTask};

use crate::engine::LoadedRule;
use crate::error::{PipelineError, StoreError};
use crate::stage_service::{StageService, TransitionRequest};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action {0} requires a project")]
    NoProject(&'static str),

    #[error("No recipient: the rule names no user and the project has no assignee or creator")]
    NoRecipient,

    #[error("Stage move cascade depth {depth} exceeds the maximum of {max}")]
    CascadeDepthExceeded { depth: i16, max: i16 },

    #[error("Automated move from stage {from} back to stage {to} needs allow_backward")]
    BackwardNotAllowed { from: StageNumber, to: StageNumber },

    #[error("Email template {0} not found or inactive")]
    TemplateNotFound(DbId),

    #[error("Project has no client email address")]
    NoClientEmail,

    #[error("Nothing to invoice: the project has no outstanding balance")]
    NothingToInvoice,

    #[error("Project {0} not found")]
    ProjectNotFound(DbId),

    #[error("Stage move failed: {0}")]
    Transition(#[source] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The notification type a rule-driven notification is filed under.
pub fn notification_type_for(trigger: &Trigger) -> NotificationType {
    match trigger {
        Trigger::StageEnter(_) => NotificationType::StageChange,
        Trigger::StageDuration(_) => NotificationType::ProjectStuck,
        Trigger::ProjectCreated => NotificationType::ProjectCreated,
        Trigger::PaymentReceived => NotificationType::PaymentReceived,
        Trigger::ConditionMet(_) | Trigger::TimeScheduled(_) => NotificationType::SystemAlert,
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ActionExecutor {
    stages: StageService,
    max_cascade_depth: i16,
}

impl ActionExecutor {
    pub fn new(stages: StageService, max_cascade_depth: i16) -> Self {
        Self {
            stages,
            max_cascade_depth,
        }
    }

    /// Run the rule's action. `cascade_depth` is the depth of the event that
    /// satisfied the trigger.
    pub async fn execute(
        &self,
        rule: &LoadedRule,
        project: Option<&ProjectState>,
        cascade_depth: i16,
        now: Timestamp,
    ) -> Result<Value, ActionError> {
        let action = &rule.action;
        let Some(project) = project else {
            return match action {
                Action::SendNotification(c) if !action.needs_project() => {
                    self.send_notification(c, rule, None, now).await
                }
                _ => Err(ActionError::NoProject(action.action_type().as_str())),
            };
        };

        match action {
            Action::SendNotification(c) => self.send_notification(c, rule, Some(project), now).await,
            Action::SendEmail(c) => self.send_email(c, project).await,
            Action::CreateTask(c) => self.create_task(c, rule, project, now).await,
            Action::AssignTeam(c) => self.assign_team(c, rule, project).await,
            Action::MoveStage(c) => self.move_stage(c, rule, project, cascade_depth).await,
            Action::FlagProject(c) => self.flag_project(c, project).await,
            Action::GenerateInvoice(c) => self.generate_invoice(c, rule, project, now).await,
            Action::CreateReminder(c) => self.create_reminder(c, rule, project, now).await,
        }
    }

    // ---- Notifications ----

    async fn send_notification(
        &self,
        config: &SendNotificationConfig,
        rule: &LoadedRule,
        project: Option<&ProjectState>,
        now: Timestamp,
    ) -> Result<Value, ActionError> {
        let recipient = config
            .user_id
            .or_else(|| project.and_then(|p| p.assigned_to.or(p.created_by)))
            .ok_or(ActionError::NoRecipient)?;
        let kind = notification_type_for(&rule.trigger);

        let store = &self.stages.context().store;
        let prefs = store.user_preferences(recipient).await?;
        if let Err(reason) = check_delivery(&prefs, kind, now) {
            tracing::debug!(
                rule_id = rule.id,
                user_id = recipient,
                reason = reason.as_str(),
                "Notification suppressed by preferences"
            );
            return Ok(json!({
                "user_id": recipient,
                "notification_type": kind.as_str(),
                "suppressed": true,
                "reason": reason.as_str(),
            }));
        }

        let ctx = project.map(TemplateContext::for_project).unwrap_or_default();
        let notification = self
            .stages
            .context()
            .notifier
            .emit(&NewNotification {
                user_id: recipient,
                notification_type: kind.as_str().to_string(),
                title: render(&config.title, &ctx),
                message: render(&config.message, &ctx),
                related_project_id: project.map(|p| p.id),
            })
            .await?;

        Ok(json!({
            "notification_id": notification.id,
            "user_id": recipient,
            "notification_type": kind.as_str(),
            "suppressed": false,
        }))
    }

    async fn send_email(
        &self,
        config: &SendEmailConfig,
        project: &ProjectState,
    ) -> Result<Value, ActionError> {
        let store = &self.stages.context().store;
        let template = store
            .active_email_template(config.template_id)
            .await?
            .ok_or(ActionError::TemplateNotFound(config.template_id))?;

        let to_email = match project.client_id {
            Some(client_id) => store.client(client_id).await?.and_then(|c| c.email),
            None => None,
        }
        .filter(|e| !e.trim().is_empty())
        .ok_or(ActionError::NoClientEmail)?;

        let ctx = TemplateContext::for_project(project);
        let email = store
            .enqueue_email(&NewQueuedEmail {
                template_id: Some(template.id),
                project_id: Some(project.id),
                to_email,
                subject: render(&template.subject, &ctx),
                body: render(&template.body, &ctx),
            })
            .await?;

        Ok(json!({ "email_id": email.id, "to": email.to_email }))
    }

    // ---- Tasks ----

    async fn create_task(
        &self,
        config: &CreateTaskConfig,
        rule: &LoadedRule,
        project: &ProjectState,
        now: Timestamp,
    ) -> Result<Value, ActionError> {
        let ctx = TemplateContext::for_project(project);
        let task = self
            .stages
            .context()
            .store
            .create_task(&NewTask {
                project_id: project.id,
                kind: task_kinds::TASK,
                title: render(&config.title, &ctx),
                description: config.description.as_deref().map(|d| render(d, &ctx)),
                amount_cents: None,
                due_date: config
                    .due_in_days
                    .map(|days| now.date_naive() + Duration::days(days)),
                assigned_to: project.assigned_to,
                created_by_rule_id: Some(rule.id),
            })
            .await?;
        Ok(json!({ "task_id": task.id, "due_date": task.due_date }))
    }

    async fn create_reminder(
        &self,
        config: &CreateReminderConfig,
        rule: &LoadedRule,
        project: &ProjectState,
        now: Timestamp,
    ) -> Result<Value, ActionError> {
        let ctx = TemplateContext::for_project(project);
        let reminder = self
            .stages
            .context()
            .store
            .create_task(&NewTask {
                project_id: project.id,
                kind: task_kinds::REMINDER,
                title: render(&config.message, &ctx),
                description: None,
                amount_cents: None,
                due_date: Some(now.date_naive() + Duration::days(config.remind_in_days)),
                assigned_to: project.assigned_to.or(project.created_by),
                created_by_rule_id: Some(rule.id),
            })
            .await?;
        Ok(json!({ "task_id": reminder.id, "due_date": reminder.due_date }))
    }

    async fn generate_invoice(
        &self,
        config: &GenerateInvoiceConfig,
        rule: &LoadedRule,
        project: &ProjectState,
        now: Timestamp,
    ) -> Result<Value, ActionError> {
        let amount = project
            .outstanding_cents()
            .filter(|c| *c > 0)
            .ok_or(ActionError::NothingToInvoice)?;
        let invoice = self
            .stages
            .context()
            .store
            .create_task(&NewTask {
                project_id: project.id,
                kind: task_kinds::INVOICE,
                title: format!("Invoice: {} ({})", project.title, format_cents(amount)),
                description: project.client_name.clone(),
                amount_cents: Some(amount),
                due_date: config
                    .due_in_days
                    .map(|days| now.date_naive() + Duration::days(days)),
                assigned_to: project.assigned_to,
                created_by_rule_id: Some(rule.id),
            })
            .await?;
        Ok(json!({ "task_id": invoice.id, "amount_cents": amount }))
    }

    // ---- Project edits ----

    async fn assign_team(
        &self,
        config: &AssignTeamConfig,
        rule: &LoadedRule,
        project: &ProjectState,
    ) -> Result<Value, ActionError> {
        let ctx = self.stages.context();
        if !ctx.store.set_assignee(project.id, config.user_id).await? {
            return Err(ActionError::ProjectNotFound(project.id));
        }
        ctx.audit_quietly(
            &AuditEntry::new(action_types::PROJECT_UPDATED, entity_types::PROJECT)
                .on(project.id)
                .with_old(json!({ "assigned_to": project.assigned_to }))
                .with_new(json!({ "assigned_to": config.user_id, "rule_id": rule.id })),
        )
        .await;
        Ok(json!({ "user_id": config.user_id, "previous": project.assigned_to }))
    }

    async fn move_stage(
        &self,
        config: &MoveStageConfig,
        rule: &LoadedRule,
        project: &ProjectState,
        cascade_depth: i16,
    ) -> Result<Value, ActionError> {
        let depth = cascade_depth.saturating_add(1);
        if depth > self.max_cascade_depth {
            return Err(ActionError::CascadeDepthExceeded {
                depth,
                max: self.max_cascade_depth,
            });
        }

        let backward = matches!(
            classify(project.stage_number, config.target_stage),
            Ok(Direction::Backward)
        );
        if backward && !config.allow_backward {
            return Err(ActionError::BackwardNotAllowed {
                from: project.stage_number,
                to: config.target_stage,
            });
        }

        let change = self
            .stages
            .request_transition(&TransitionRequest {
                project_id: project.id,
                target_stage: config.target_stage,
                confirmed: config.allow_backward,
                changed_by: None,
                notes: Some(format!("Automation rule #{}: {}", rule.id, rule.name)),
                cascade_depth: depth,
            })
            .await
            .map_err(ActionError::Transition)?;

        Ok(json!({
            "from_stage": change.plan.from.number,
            "to_stage": change.plan.to.number,
            "history_id": change.history.id,
            "cascade_depth": depth,
        }))
    }

    async fn flag_project(
        &self,
        config: &FlagProjectConfig,
        project: &ProjectState,
    ) -> Result<Value, ActionError> {
        let message = config
            .message
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "Project \"{}\" flagged: {}",
                    project.title,
                    config.flag_type.as_str()
                )
            });
        let alert = self
            .stages
            .context()
            .store
            .open_alert(&NewAlert {
                project_id: project.id,
                alert_type: AlertType::Custom.as_str().to_string(),
                severity: config.flag_type.severity().as_str().to_string(),
                message,
            })
            .await?;
        Ok(json!({
            "alert_id": alert.map(|a| a.id),
            "flag_type": config.flag_type.as_str(),
        }))
    }
}
