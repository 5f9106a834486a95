//! PostgreSQL-backed collaborators, delegating to the `stageflow-db`
//! repositories.

use async_trait::async_trait;
use stageflow_core::audit::AuditEntry;
use stageflow_core::notifications::UserPreferences;
use stageflow_core::project::ProjectState;
use stageflow_core::types::{Cents, DbId, Timestamp};
use stageflow_db::models::alert::{NewAlert, ProjectAlert};
use stageflow_db::models::audit::AuditLog;
use stageflow_db::models::automation::{
    AutomationExecution, AutomationRule, CreateAutomationRule, NewExecution,
};
use stageflow_db::models::client::Client;
use stageflow_db::models::email::{EmailTemplate, NewQueuedEmail, QueuedEmail};
use stageflow_db::models::notification::{NewNotification, Notification};
use stageflow_db::models::pipeline_event::PipelineEventRow;
use stageflow_db::models::project::{
    CommittedTransition, CreateProject, CreatedProject, RecordedPayment,
};
use stageflow_db::models::stage_history::StageHistory;
use stageflow_db::models::task::{NewTask, ProjectTask};
use stageflow_db::repositories::project_repo::StageCommit;
use stageflow_db::repositories::{
    AuditLogRepo, AutomationExecutionRepo, AutomationRuleRepo, AutomationTriggerRepo, ClientRepo,
    EmailQueueRepo, EmailTemplateRepo, NotificationRepo, PipelineEventRepo, ProjectAlertRepo,
    ProjectRepo, ProjectTaskRepo, StageHistoryRepo, UserPreferenceRepo,
};
use stageflow_db::DbPool;

use crate::error::StoreError;
use crate::store::{AuditSink, NotificationSink, PipelineStore};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn create_project(&self, input: &CreateProject) -> Result<CreatedProject, StoreError> {
        Ok(ProjectRepo::create_with_history(&self.pool, input).await?)
    }

    async fn project_state(&self, project_id: DbId) -> Result<Option<ProjectState>, StoreError> {
        Ok(ProjectRepo::snapshot(&self.pool, project_id)
            .await?
            .map(ProjectState::from))
    }

    async fn project_states(
        &self,
        include_completed: bool,
    ) -> Result<Vec<ProjectState>, StoreError> {
        let rows = ProjectRepo::list_snapshots(&self.pool, include_completed).await?;
        Ok(rows.into_iter().map(ProjectState::from).collect())
    }

    async fn client_project_states(
        &self,
        client_id: DbId,
    ) -> Result<Vec<ProjectState>, StoreError> {
        let rows = ProjectRepo::list_snapshots_by_client(&self.pool, client_id).await?;
        Ok(rows.into_iter().map(ProjectState::from).collect())
    }

    async fn commit_transition(
        &self,
        commit: &StageCommit<'_>,
    ) -> Result<CommittedTransition, StoreError> {
        ProjectRepo::apply_transition(&self.pool, commit)
            .await?
            .ok_or_else(|| {
                StoreError::Conflict(format!(
                    "Project {} is no longer at stage {}",
                    commit.project_id, commit.plan.from.number
                ))
            })
    }

    async fn record_payment(
        &self,
        project_id: DbId,
        amount_cents: Cents,
        recorded_by: Option<DbId>,
    ) -> Result<RecordedPayment, StoreError> {
        ProjectRepo::record_payment(&self.pool, project_id, amount_cents, recorded_by)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "Project",
                id: project_id,
            })
    }

    async fn set_assignee(&self, project_id: DbId, user_id: DbId) -> Result<bool, StoreError> {
        Ok(ProjectRepo::set_assignee(&self.pool, project_id, user_id).await?)
    }

    async fn stage_history(&self, project_id: DbId) -> Result<Vec<StageHistory>, StoreError> {
        Ok(StageHistoryRepo::list_for_project(&self.pool, project_id).await?)
    }

    async fn client(&self, client_id: DbId) -> Result<Option<Client>, StoreError> {
        Ok(ClientRepo::find_by_id(&self.pool, client_id).await?)
    }

    async fn unprocessed_events(&self, limit: i64) -> Result<Vec<PipelineEventRow>, StoreError> {
        Ok(PipelineEventRepo::list_unprocessed(&self.pool, limit).await?)
    }

    async fn mark_event_processed(&self, event_id: DbId) -> Result<bool, StoreError> {
        Ok(PipelineEventRepo::mark_processed(&self.pool, event_id).await?)
    }

    async fn create_rule(
        &self,
        input: &CreateAutomationRule,
    ) -> Result<AutomationRule, StoreError> {
        Ok(AutomationRuleRepo::create(&self.pool, input).await?)
    }

    async fn active_rules(
        &self,
        trigger_types: Option<&[&str]>,
    ) -> Result<Vec<AutomationRule>, StoreError> {
        Ok(AutomationRuleRepo::list_active(&self.pool, trigger_types).await?)
    }

    async fn claim_trigger(
        &self,
        rule_id: DbId,
        dedup_key: &str,
        project_id: Option<DbId>,
    ) -> Result<bool, StoreError> {
        Ok(AutomationTriggerRepo::claim(&self.pool, rule_id, dedup_key, project_id).await?)
    }

    async fn release_trigger(&self, rule_id: DbId, dedup_key: &str) -> Result<bool, StoreError> {
        Ok(AutomationTriggerRepo::release(&self.pool, rule_id, dedup_key).await?)
    }

    async fn record_execution(
        &self,
        input: &NewExecution,
    ) -> Result<AutomationExecution, StoreError> {
        Ok(AutomationExecutionRepo::create(&self.pool, input).await?)
    }

    async fn touch_rule(&self, rule_id: DbId, at: Timestamp) -> Result<(), StoreError> {
        Ok(AutomationRuleRepo::touch_last_triggered(&self.pool, rule_id, at).await?)
    }

    async fn open_alert(&self, input: &NewAlert) -> Result<Option<ProjectAlert>, StoreError> {
        Ok(ProjectAlertRepo::create_if_absent(&self.pool, input).await?)
    }

    async fn create_task(&self, input: &NewTask) -> Result<ProjectTask, StoreError> {
        Ok(ProjectTaskRepo::create(&self.pool, input).await?)
    }

    async fn active_email_template(
        &self,
        template_id: DbId,
    ) -> Result<Option<EmailTemplate>, StoreError> {
        Ok(EmailTemplateRepo::find_active(&self.pool, template_id).await?)
    }

    async fn enqueue_email(&self, input: &NewQueuedEmail) -> Result<QueuedEmail, StoreError> {
        Ok(EmailQueueRepo::enqueue(&self.pool, input).await?)
    }

    async fn user_preferences(&self, user_id: DbId) -> Result<UserPreferences, StoreError> {
        Ok(UserPreferenceRepo::get_or_default(&self.pool, user_id).await?)
    }

    async fn count_active_rules(&self) -> Result<i64, StoreError> {
        Ok(AutomationRuleRepo::count_active(&self.pool).await?)
    }

    async fn count_open_alerts(&self) -> Result<i64, StoreError> {
        Ok(ProjectAlertRepo::count_open(&self.pool).await?)
    }

    async fn count_executions_since(&self, since: Timestamp) -> Result<i64, StoreError> {
        Ok(AutomationExecutionRepo::count_since(&self.pool, since).await?)
    }
}

#[async_trait]
impl NotificationSink for PgStore {
    async fn emit(&self, notification: &NewNotification) -> Result<Notification, StoreError> {
        Ok(NotificationRepo::create(&self.pool, notification).await?)
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn record(&self, entry: &AuditEntry) -> Result<AuditLog, StoreError> {
        Ok(AuditLogRepo::create(&self.pool, entry).await?)
    }
}
