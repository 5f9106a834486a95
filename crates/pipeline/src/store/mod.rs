//! Collaborator interfaces consumed by the pipeline services.
//!
//! [`PipelineStore`] is the record-oriented persistence interface,
//! [`NotificationSink`] and [`AuditSink`] are the two emission interfaces.
//! All state is re-read through these traits on every evaluation.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

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
use stageflow_events::EventBus;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PipelineStore: Send + Sync {
    // ---- Projects ----

    /// Create a project at the initial stage with its creation history entry
    /// and outbox event, atomically.
    async fn create_project(&self, input: &CreateProject) -> Result<CreatedProject, StoreError>;

    async fn project_state(&self, project_id: DbId) -> Result<Option<ProjectState>, StoreError>;

    async fn project_states(&self, include_completed: bool)
        -> Result<Vec<ProjectState>, StoreError>;

    async fn client_project_states(&self, client_id: DbId)
        -> Result<Vec<ProjectState>, StoreError>;

    /// Commit a validated transition together with its history entry and
    /// outbox event. Fails with [`StoreError::Conflict`] if the project is no
    /// longer at `commit.plan.from`, writing nothing.
    async fn commit_transition(
        &self,
        commit: &StageCommit<'_>,
    ) -> Result<CommittedTransition, StoreError>;

    async fn record_payment(
        &self,
        project_id: DbId,
        amount_cents: Cents,
        recorded_by: Option<DbId>,
    ) -> Result<RecordedPayment, StoreError>;

    /// Returns `false` if the project does not exist.
    async fn set_assignee(&self, project_id: DbId, user_id: DbId) -> Result<bool, StoreError>;

    async fn stage_history(&self, project_id: DbId) -> Result<Vec<StageHistory>, StoreError>;

    async fn client(&self, client_id: DbId) -> Result<Option<Client>, StoreError>;

    // ---- Outbox ----

    async fn unprocessed_events(&self, limit: i64) -> Result<Vec<PipelineEventRow>, StoreError>;

    async fn mark_event_processed(&self, event_id: DbId) -> Result<bool, StoreError>;

    // ---- Rules ----

    async fn create_rule(&self, input: &CreateAutomationRule)
        -> Result<AutomationRule, StoreError>;

    /// Active rules, optionally restricted to the given trigger types.
    async fn active_rules(
        &self,
        trigger_types: Option<&[&str]>,
    ) -> Result<Vec<AutomationRule>, StoreError>;

    /// Insert the `(rule, key)` claim. `false` means it was already claimed.
    async fn claim_trigger(
        &self,
        rule_id: DbId,
        dedup_key: &str,
        project_id: Option<DbId>,
    ) -> Result<bool, StoreError>;

    /// Drop a claim whose execution could not be recorded. `false` means
    /// there was nothing to release.
    async fn release_trigger(&self, rule_id: DbId, dedup_key: &str) -> Result<bool, StoreError>;

    async fn record_execution(&self, input: &NewExecution)
        -> Result<AutomationExecution, StoreError>;

    async fn touch_rule(&self, rule_id: DbId, at: Timestamp) -> Result<(), StoreError>;

    // ---- Action targets ----

    /// Open an alert unless an unresolved one of the same type exists.
    async fn open_alert(&self, input: &NewAlert) -> Result<Option<ProjectAlert>, StoreError>;

    async fn create_task(&self, input: &NewTask) -> Result<ProjectTask, StoreError>;

    async fn active_email_template(
        &self,
        template_id: DbId,
    ) -> Result<Option<EmailTemplate>, StoreError>;

    async fn enqueue_email(&self, input: &NewQueuedEmail) -> Result<QueuedEmail, StoreError>;

    /// Stored preferences, or the defaults when the user has none.
    async fn user_preferences(&self, user_id: DbId) -> Result<UserPreferences, StoreError>;

    // ---- Dashboard counters ----

    async fn count_active_rules(&self) -> Result<i64, StoreError>;

    async fn count_open_alerts(&self) -> Result<i64, StoreError>;

    async fn count_executions_since(&self, since: Timestamp) -> Result<i64, StoreError>;
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, notification: &NewNotification) -> Result<Notification, StoreError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<AuditLog, StoreError>;
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The collaborators a pipeline service runs against.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn PipelineStore>,
    pub notifier: Arc<dyn NotificationSink>,
    pub audit: Arc<dyn AuditSink>,
    /// Committed events are published here for immediate evaluation.
    pub bus: Option<Arc<EventBus>>,
}

impl PipelineContext {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        notifier: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            notifier,
            audit,
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Build a context where one value serves every collaborator role.
    pub fn single<T>(backend: Arc<T>) -> Self
    where
        T: PipelineStore + NotificationSink + AuditSink + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend)
    }

    /// Write an audit entry. Failures are logged, never propagated.
    pub(crate) async fn audit_quietly(&self, entry: &AuditEntry) {
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!(
                error = %e,
                action_type = entry.action_type,
                entity_id = ?entry.entity_id,
                "Failed to write audit entry"
            );
        }
    }
}
