//! In-memory collaborators with the same write semantics as the PostgreSQL
//! store: atomic creation/transition/payment writes with outbox rows,
//! optimistic stage commits, unique trigger claims, and open-alert dedup.
//!
//! Used by the engine tests and usable as a local sandbox.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use stageflow_core::alerts::AlertType;
use stageflow_core::audit::AuditEntry;
use stageflow_core::evaluation::Change;
use stageflow_core::notifications::UserPreferences;
use stageflow_core::project::ProjectState;
use stageflow_core::stages;
use stageflow_core::types::{Cents, DbId, Timestamp};
use stageflow_db::models::alert::{NewAlert, ProjectAlert};
use stageflow_db::models::audit::AuditLog;
use stageflow_db::models::automation::{
    AutomationExecution, AutomationRule, CreateAutomationRule, NewExecution,
};
use stageflow_db::models::client::{Client, CreateClient};
use stageflow_db::models::email::{
    email_status, CreateEmailTemplate, EmailTemplate, NewQueuedEmail, QueuedEmail,
};
use stageflow_db::models::notification::{NewNotification, Notification};
use stageflow_db::models::pipeline_event::PipelineEventRow;
use stageflow_db::models::project::{
    CommittedTransition, CreateProject, CreatedProject, Project, RecordedPayment,
};
use stageflow_db::models::stage_history::StageHistory;
use stageflow_db::models::task::{NewTask, ProjectTask};
use stageflow_db::repositories::project_repo::StageCommit;

use crate::error::StoreError;
use crate::store::{AuditSink, NotificationSink, PipelineStore};

#[derive(Default)]
struct MemoryState {
    next_id: DbId,
    clients: Vec<Client>,
    projects: Vec<Project>,
    history: Vec<StageHistory>,
    events: Vec<PipelineEventRow>,
    rules: Vec<AutomationRule>,
    claims: HashSet<(DbId, String)>,
    executions: Vec<AutomationExecution>,
    alerts: Vec<ProjectAlert>,
    notifications: Vec<Notification>,
    audit: Vec<AuditLog>,
    tasks: Vec<ProjectTask>,
    templates: Vec<EmailTemplate>,
    emails: Vec<QueuedEmail>,
    preferences: HashMap<DbId, UserPreferences>,
    failing_claims: usize,
    failing_execution_writes: usize,
}

/// An outbox payload, encoded before any state is touched so an encoding
/// failure leaves nothing half written.
struct EncodedChange {
    kind: &'static str,
    payload: serde_json::Value,
}

impl EncodedChange {
    fn new(change: &Change) -> Result<Self, StoreError> {
        let payload = serde_json::to_value(change)
            .map_err(|e| StoreError::Unavailable(format!("Cannot encode event: {e}")))?;
        Ok(Self {
            kind: change.kind(),
            payload,
        })
    }
}

/// Consume one injected failure, if any are pending.
fn injected_failure(pending: &mut usize, operation: &str) -> Result<(), StoreError> {
    if *pending == 0 {
        return Ok(());
    }
    *pending -= 1;
    Err(StoreError::Unavailable(format!("{operation} is unavailable")))
}

impl MemoryState {
    fn id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn project_mut(&mut self, id: DbId) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }

    fn latest_history(&self, project_id: DbId) -> Option<&StageHistory> {
        self.history
            .iter()
            .filter(|h| h.project_id == project_id)
            .max_by_key(|h| h.id)
    }

    fn state_of(&self, project: &Project) -> Option<ProjectState> {
        let latest = self.latest_history(project.id)?;
        let client_name = project.client_id.and_then(|cid| {
            self.clients
                .iter()
                .find(|c| c.id == cid)
                .map(|c| c.name.clone())
        });
        Some(ProjectState {
            id: project.id,
            title: project.title.clone(),
            client_id: project.client_id,
            client_name,
            current_stage: project.current_stage.clone(),
            stage_number: project.stage_number,
            budget_cents: project.budget_cents,
            paid_cents: project.paid_cents,
            assigned_to: project.assigned_to,
            created_by: project.created_by,
            notes: project.notes.clone(),
            start_date: project.start_date,
            deadline: project.deadline,
            completion_date: project.completion_date,
            last_history_id: latest.id,
            stage_entered_at: latest.created_at,
            created_at: project.created_at,
        })
    }

    fn push_history(
        &mut self,
        id: DbId,
        project_id: DbId,
        from: Option<(&str, i16)>,
        to: (&str, i16),
        changed_by: Option<DbId>,
        notes: Option<&str>,
    ) -> StageHistory {
        let entry = StageHistory {
            id,
            project_id,
            from_stage: from.map(|(name, _)| name.to_string()),
            to_stage: to.0.to_string(),
            from_stage_number: from.map(|(_, number)| number),
            to_stage_number: to.1,
            changed_by,
            notes: notes.map(str::to_string),
            created_at: Utc::now(),
        };
        self.history.push(entry.clone());
        entry
    }

    fn push_event(
        &mut self,
        project_id: DbId,
        change: EncodedChange,
        actor_user_id: Option<DbId>,
        cascade_depth: i16,
    ) -> DbId {
        let id = self.id();
        self.events.push(PipelineEventRow {
            id,
            project_id,
            event_type: change.kind.to_string(),
            payload: change.payload,
            actor_user_id,
            cascade_depth,
            created_at: Utc::now(),
            processed_at: None,
        });
        id
    }
}

/// Thread-safe in-memory implementation of every collaborator trait.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- Seeding ----

    pub fn add_client(&self, input: &CreateClient) -> Client {
        let mut s = self.lock();
        let now = Utc::now();
        let client = Client {
            id: s.id(),
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            company: input.company.clone(),
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        s.clients.push(client.clone());
        client
    }

    pub fn add_email_template(&self, input: &CreateEmailTemplate) -> EmailTemplate {
        let mut s = self.lock();
        let now = Utc::now();
        let template = EmailTemplate {
            id: s.id(),
            name: input.name.clone(),
            subject: input.subject.clone(),
            body: input.body.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        s.templates.push(template.clone());
        template
    }

    pub fn set_preferences(&self, user_id: DbId, prefs: UserPreferences) {
        self.lock().preferences.insert(user_id, prefs);
    }

    /// Fail the next `n` trigger claims with [`StoreError::Unavailable`].
    pub fn fail_next_claims(&self, n: usize) {
        self.lock().failing_claims = n;
    }

    /// Fail the next `n` execution writes with [`StoreError::Unavailable`].
    pub fn fail_next_execution_writes(&self, n: usize) {
        self.lock().failing_execution_writes = n;
    }

    pub fn is_claimed(&self, rule_id: DbId, dedup_key: &str) -> bool {
        self.lock()
            .claims
            .contains(&(rule_id, dedup_key.to_string()))
    }

    /// Pretend the project entered its current stage at `at`.
    pub fn backdate_stage_entry(&self, project_id: DbId, at: Timestamp) -> bool {
        let mut s = self.lock();
        let latest = s
            .history
            .iter_mut()
            .filter(|h| h.project_id == project_id)
            .max_by_key(|h| h.id);
        match latest {
            Some(entry) => {
                entry.created_at = at;
                true
            }
            None => false,
        }
    }

    pub fn set_deadline(&self, project_id: DbId, deadline: Option<chrono::NaiveDate>) -> bool {
        let mut s = self.lock();
        match s.project_mut(project_id) {
            Some(p) => {
                p.deadline = deadline;
                true
            }
            None => false,
        }
    }

    /// Append an outbox row verbatim, bypassing payload encoding.
    pub fn push_raw_event(
        &self,
        project_id: DbId,
        event_type: &str,
        payload: serde_json::Value,
    ) -> DbId {
        let mut s = self.lock();
        let id = s.id();
        s.events.push(PipelineEventRow {
            id,
            project_id,
            event_type: event_type.to_string(),
            payload,
            actor_user_id: None,
            cascade_depth: 0,
            created_at: Utc::now(),
            processed_at: None,
        });
        id
    }

    // ---- Inspection ----

    pub fn project(&self, id: DbId) -> Option<Project> {
        self.lock().projects.iter().find(|p| p.id == id).cloned()
    }

    pub fn history_for(&self, project_id: DbId) -> Vec<StageHistory> {
        let mut rows: Vec<_> = self
            .lock()
            .history
            .iter()
            .filter(|h| h.project_id == project_id)
            .cloned()
            .collect();
        rows.sort_by_key(|h| h.id);
        rows
    }

    pub fn events(&self) -> Vec<PipelineEventRow> {
        self.lock().events.clone()
    }

    pub fn executions(&self) -> Vec<AutomationExecution> {
        self.lock().executions.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn alerts(&self) -> Vec<ProjectAlert> {
        self.lock().alerts.clone()
    }

    pub fn audit_logs(&self) -> Vec<AuditLog> {
        self.lock().audit.clone()
    }

    pub fn tasks(&self) -> Vec<ProjectTask> {
        self.lock().tasks.clone()
    }

    pub fn emails(&self) -> Vec<QueuedEmail> {
        self.lock().emails.clone()
    }

    pub fn rule(&self, id: DbId) -> Option<AutomationRule> {
        self.lock().rules.iter().find(|r| r.id == id).cloned()
    }

    pub fn set_rule_dry_run(&self, id: DbId, dry_run: bool) -> bool {
        let mut s = self.lock();
        match s.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.dry_run = dry_run;
                true
            }
            None => false,
        }
    }

    pub fn resolve_alert(&self, id: DbId, resolved_by: Option<DbId>) -> bool {
        let mut s = self.lock();
        match s.alerts.iter_mut().find(|a| a.id == id && !a.is_resolved) {
            Some(alert) => {
                alert.is_resolved = true;
                alert.resolved_at = Some(Utc::now());
                alert.resolved_by = resolved_by;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn create_project(&self, input: &CreateProject) -> Result<CreatedProject, StoreError> {
        let initial = stages::initial_stage();
        let mut s = self.lock();
        let now = Utc::now();
        let project_id = s.id();
        let history_id = s.id();
        let change = EncodedChange::new(&Change::ProjectCreated { history_id })?;
        let project = Project {
            id: project_id,
            title: input.title.clone(),
            description: input.description.clone(),
            client_id: input.client_id,
            current_stage: initial.name.to_string(),
            stage_number: initial.number,
            budget_cents: input.budget_cents,
            paid_cents: 0,
            notes: input.notes.clone(),
            start_date: input.start_date,
            deadline: input.deadline,
            completion_date: None,
            assigned_to: input.assigned_to,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        s.projects.push(project.clone());
        let history = s.push_history(
            history_id,
            project.id,
            None,
            (initial.name, initial.number),
            input.created_by,
            None,
        );
        let event_id = s.push_event(project.id, change, input.created_by, 0);
        Ok(CreatedProject {
            project,
            history,
            event_id,
        })
    }

    async fn project_state(&self, project_id: DbId) -> Result<Option<ProjectState>, StoreError> {
        let s = self.lock();
        Ok(s.projects
            .iter()
            .find(|p| p.id == project_id)
            .and_then(|p| s.state_of(p)))
    }

    async fn project_states(
        &self,
        include_completed: bool,
    ) -> Result<Vec<ProjectState>, StoreError> {
        let s = self.lock();
        Ok(s.projects
            .iter()
            .filter(|p| include_completed || !stages::is_completed(p.stage_number))
            .filter_map(|p| s.state_of(p))
            .collect())
    }

    async fn client_project_states(
        &self,
        client_id: DbId,
    ) -> Result<Vec<ProjectState>, StoreError> {
        let s = self.lock();
        Ok(s.projects
            .iter()
            .filter(|p| p.client_id == Some(client_id))
            .filter_map(|p| s.state_of(p))
            .collect())
    }

    async fn commit_transition(
        &self,
        commit: &StageCommit<'_>,
    ) -> Result<CommittedTransition, StoreError> {
        let plan = commit.plan;
        let mut s = self.lock();
        let at_expected_stage = s
            .projects
            .iter()
            .any(|p| p.id == commit.project_id && p.stage_number == plan.from.number);
        if !at_expected_stage {
            return Err(StoreError::Conflict(format!(
                "Project {} is no longer at stage {}",
                commit.project_id, plan.from.number
            )));
        }

        let history_id = s.id();
        let change = EncodedChange::new(&Change::StageEntered {
            history_id,
            from_stage: Some(plan.from.number),
            to_stage: plan.to.number,
        })?;

        if let Some(project) = s.project_mut(commit.project_id) {
            project.current_stage = plan.to.name.to_string();
            project.stage_number = plan.to.number;
            project.updated_at = Utc::now();
            if plan.completes_project() {
                project.completion_date = Some(commit.today);
            } else if plan.reopens_project() {
                project.completion_date = None;
            }
        }

        let history = s.push_history(
            history_id,
            commit.project_id,
            Some((plan.from.name, plan.from.number)),
            (plan.to.name, plan.to.number),
            commit.changed_by,
            commit.notes,
        );
        let event_id = s.push_event(
            commit.project_id,
            change,
            commit.changed_by,
            commit.cascade_depth,
        );
        Ok(CommittedTransition { history, event_id })
    }

    async fn record_payment(
        &self,
        project_id: DbId,
        amount_cents: Cents,
        recorded_by: Option<DbId>,
    ) -> Result<RecordedPayment, StoreError> {
        let mut s = self.lock();
        let (previous_paid_cents, budget_cents) = s
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .map(|p| (p.paid_cents, p.budget_cents))
            .ok_or(StoreError::NotFound {
                entity: "Project",
                id: project_id,
            })?;
        let paid_cents = previous_paid_cents + amount_cents;
        let change = EncodedChange::new(&Change::PaymentRecorded {
            previous_paid_cents,
            paid_cents,
            budget_cents,
        })?;

        if let Some(project) = s.project_mut(project_id) {
            project.paid_cents = paid_cents;
            project.updated_at = Utc::now();
        }
        let event_id = s.push_event(project_id, change, recorded_by, 0);
        Ok(RecordedPayment {
            previous_paid_cents,
            paid_cents,
            budget_cents,
            event_id,
        })
    }

    async fn set_assignee(&self, project_id: DbId, user_id: DbId) -> Result<bool, StoreError> {
        let mut s = self.lock();
        Ok(match s.project_mut(project_id) {
            Some(p) => {
                p.assigned_to = Some(user_id);
                p.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn stage_history(&self, project_id: DbId) -> Result<Vec<StageHistory>, StoreError> {
        Ok(self.history_for(project_id))
    }

    async fn client(&self, client_id: DbId) -> Result<Option<Client>, StoreError> {
        Ok(self
            .lock()
            .clients
            .iter()
            .find(|c| c.id == client_id)
            .cloned())
    }

    async fn unprocessed_events(&self, limit: i64) -> Result<Vec<PipelineEventRow>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let s = self.lock();
        let mut rows: Vec<_> = s
            .events
            .iter()
            .filter(|e| e.processed_at.is_none())
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.id);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_event_processed(&self, event_id: DbId) -> Result<bool, StoreError> {
        let mut s = self.lock();
        Ok(
            match s
                .events
                .iter_mut()
                .find(|e| e.id == event_id && e.processed_at.is_none())
            {
                Some(event) => {
                    event.processed_at = Some(Utc::now());
                    true
                }
                None => false,
            },
        )
    }

    async fn create_rule(
        &self,
        input: &CreateAutomationRule,
    ) -> Result<AutomationRule, StoreError> {
        let mut s = self.lock();
        let now = Utc::now();
        let rule = AutomationRule {
            id: s.id(),
            name: input.name.clone(),
            description: input.description.clone(),
            trigger_type: input.trigger_type.clone(),
            trigger_config: input.trigger_config.clone(),
            action_type: input.action_type.clone(),
            action_config: input.action_config.clone(),
            is_active: input.is_active,
            dry_run: input.dry_run,
            created_by: input.created_by,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };
        s.rules.push(rule.clone());
        Ok(rule)
    }

    async fn active_rules(
        &self,
        trigger_types: Option<&[&str]>,
    ) -> Result<Vec<AutomationRule>, StoreError> {
        let s = self.lock();
        let mut rules: Vec<_> = s
            .rules
            .iter()
            .filter(|r| r.is_active)
            .filter(|r| trigger_types.map_or(true, |types| types.contains(&r.trigger_type.as_str())))
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn claim_trigger(
        &self,
        rule_id: DbId,
        dedup_key: &str,
        _project_id: Option<DbId>,
    ) -> Result<bool, StoreError> {
        let mut s = self.lock();
        injected_failure(&mut s.failing_claims, "claim_trigger")?;
        Ok(s.claims.insert((rule_id, dedup_key.to_string())))
    }

    async fn release_trigger(&self, rule_id: DbId, dedup_key: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .claims
            .remove(&(rule_id, dedup_key.to_string())))
    }

    async fn record_execution(
        &self,
        input: &NewExecution,
    ) -> Result<AutomationExecution, StoreError> {
        let mut s = self.lock();
        injected_failure(&mut s.failing_execution_writes, "record_execution")?;
        let execution = AutomationExecution {
            id: s.id(),
            rule_id: input.rule_id,
            project_id: input.project_id,
            dedup_key: input.dedup_key.clone(),
            status: input.status.clone(),
            dry_run: input.dry_run,
            details: input.details.clone(),
            error_message: input.error_message.clone(),
            executed_at: Utc::now(),
        };
        s.executions.push(execution.clone());
        Ok(execution)
    }

    async fn touch_rule(&self, rule_id: DbId, at: Timestamp) -> Result<(), StoreError> {
        if let Some(rule) = self.lock().rules.iter_mut().find(|r| r.id == rule_id) {
            rule.last_triggered_at = Some(at);
        }
        Ok(())
    }

    async fn open_alert(&self, input: &NewAlert) -> Result<Option<ProjectAlert>, StoreError> {
        let mut s = self.lock();
        let deduped = input.alert_type != AlertType::Custom.as_str();
        let exists = s.alerts.iter().any(|a| {
            a.project_id == input.project_id && a.alert_type == input.alert_type && !a.is_resolved
        });
        if deduped && exists {
            return Ok(None);
        }
        let alert = ProjectAlert {
            id: s.id(),
            project_id: input.project_id,
            alert_type: input.alert_type.clone(),
            severity: input.severity.clone(),
            message: input.message.clone(),
            is_resolved: false,
            resolved_at: None,
            resolved_by: None,
            created_at: Utc::now(),
        };
        s.alerts.push(alert.clone());
        Ok(Some(alert))
    }

    async fn create_task(&self, input: &NewTask) -> Result<ProjectTask, StoreError> {
        let mut s = self.lock();
        let task = ProjectTask {
            id: s.id(),
            project_id: input.project_id,
            kind: input.kind.to_string(),
            title: input.title.clone(),
            description: input.description.clone(),
            amount_cents: input.amount_cents,
            due_date: input.due_date,
            assigned_to: input.assigned_to,
            created_by_rule_id: input.created_by_rule_id,
            is_done: false,
            created_at: Utc::now(),
        };
        s.tasks.push(task.clone());
        Ok(task)
    }

    async fn active_email_template(
        &self,
        template_id: DbId,
    ) -> Result<Option<EmailTemplate>, StoreError> {
        Ok(self
            .lock()
            .templates
            .iter()
            .find(|t| t.id == template_id && t.is_active)
            .cloned())
    }

    async fn enqueue_email(&self, input: &NewQueuedEmail) -> Result<QueuedEmail, StoreError> {
        let mut s = self.lock();
        let email = QueuedEmail {
            id: s.id(),
            template_id: input.template_id,
            project_id: input.project_id,
            to_email: input.to_email.clone(),
            subject: input.subject.clone(),
            body: input.body.clone(),
            status: email_status::PENDING.to_string(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            sent_at: None,
        };
        s.emails.push(email.clone());
        Ok(email)
    }

    async fn user_preferences(&self, user_id: DbId) -> Result<UserPreferences, StoreError> {
        Ok(self
            .lock()
            .preferences
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn count_active_rules(&self) -> Result<i64, StoreError> {
        Ok(self.lock().rules.iter().filter(|r| r.is_active).count() as i64)
    }

    async fn count_open_alerts(&self) -> Result<i64, StoreError> {
        Ok(self.lock().alerts.iter().filter(|a| !a.is_resolved).count() as i64)
    }

    async fn count_executions_since(&self, since: Timestamp) -> Result<i64, StoreError> {
        Ok(self
            .lock()
            .executions
            .iter()
            .filter(|e| e.executed_at >= since)
            .count() as i64)
    }
}

#[async_trait]
impl NotificationSink for MemoryStore {
    async fn emit(&self, notification: &NewNotification) -> Result<Notification, StoreError> {
        let mut s = self.lock();
        let row = Notification {
            id: s.id(),
            user_id: notification.user_id,
            notification_type: notification.notification_type.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            related_project_id: notification.related_project_id,
            is_read: false,
            created_at: Utc::now(),
        };
        s.notifications.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, entry: &AuditEntry) -> Result<AuditLog, StoreError> {
        let mut s = self.lock();
        let row = AuditLog {
            id: s.id(),
            user_id: entry.user_id,
            action_type: entry.action_type.to_string(),
            entity_type: entry.entity_type.to_string(),
            entity_id: entry.entity_id,
            old_values: entry.old_values.clone(),
            new_values: entry.new_values.clone(),
            created_at: Utc::now(),
        };
        s.audit.push(row.clone());
        Ok(row)
    }
}
