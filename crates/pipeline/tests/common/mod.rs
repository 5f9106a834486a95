//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use stageflow_core::automation::RuleDefinition;
use stageflow_core::notifications::UserPreferences;
use stageflow_core::types::{Cents, DbId, StageNumber, Timestamp};
use stageflow_db::models::automation::AutomationRule;
use stageflow_db::models::notification::{NewNotification, Notification};
use stageflow_db::models::project::{CreateProject, CreatedProject};
use stageflow_pipeline::relay::DEFAULT_BATCH_SIZE;
use stageflow_pipeline::{
    AutomationEngine, EngineConfig, MemoryStore, NotificationSink, OutboxRelay, PipelineContext,
    PipelineStore, StageService, StoreError, TransitionRequest,
};

pub const OWNER: DbId = 900;

/// Everything a test needs, wired against one [`MemoryStore`].
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ctx: PipelineContext,
    pub stages: StageService,
    pub engine: AutomationEngine,
    pub relay: OutboxRelay,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_context(store.clone(), PipelineContext::single(store))
    }

    /// A harness whose notifier always fails.
    pub fn with_failing_notifier() -> Self {
        let store = Arc::new(MemoryStore::new());
        let ctx = PipelineContext::new(store.clone(), Arc::new(FailingNotifier), store.clone());
        Self::with_context(store, ctx)
    }

    pub fn with_max_depth(max_cascade_depth: i16) -> Self {
        let store = Arc::new(MemoryStore::new());
        let ctx = PipelineContext::single(store.clone());
        Self::build(store, ctx, EngineConfig { max_cascade_depth })
    }

    fn with_context(store: Arc<MemoryStore>, ctx: PipelineContext) -> Self {
        Self::build(store, ctx, EngineConfig::default())
    }

    fn build(store: Arc<MemoryStore>, ctx: PipelineContext, config: EngineConfig) -> Self {
        store.set_preferences(OWNER, always_deliver());
        let engine = AutomationEngine::new(ctx.clone(), config);
        Self {
            stages: StageService::new(ctx.clone()),
            relay: OutboxRelay::new(ctx.clone(), engine.clone(), DEFAULT_BATCH_SIZE),
            engine,
            store,
            ctx,
        }
    }

    /// Create a project owned by [`OWNER`].
    pub async fn project(&self, title: &str) -> CreatedProject {
        self.project_with(CreateProject {
            title: title.into(),
            created_by: Some(OWNER),
            ..Default::default()
        })
        .await
    }

    pub async fn project_with(&self, input: CreateProject) -> CreatedProject {
        self.stages.create_project(&input).await.unwrap()
    }

    /// Walk a project forward to `stage` and drop the resulting outbox rows.
    pub async fn project_at(&self, title: &str, stage: StageNumber) -> DbId {
        let id = self.project(title).await.project.id;
        if stage > 1 {
            self.move_to(id, stage).await;
        }
        self.mark_all_processed().await;
        id
    }

    pub async fn project_with_budget(
        &self,
        title: &str,
        client_id: Option<DbId>,
        budget_cents: Cents,
    ) -> DbId {
        let created = self
            .project_with(CreateProject {
                title: title.into(),
                client_id,
                budget_cents: Some(budget_cents),
                created_by: Some(OWNER),
                ..Default::default()
            })
            .await;
        created.project.id
    }

    pub async fn move_to(&self, project_id: DbId, stage: StageNumber) {
        self.stages
            .request_transition(&TransitionRequest::new(project_id, stage).confirmed())
            .await
            .unwrap();
    }

    pub async fn mark_all_processed(&self) {
        for row in self.store.events() {
            self.store.mark_event_processed(row.id).await.unwrap();
        }
    }

    pub async fn rule(
        &self,
        trigger_type: &str,
        trigger: Value,
        action_type: &str,
        action: Value,
    ) -> AutomationRule {
        let def =
            RuleDefinition::parse("Test rule", None, trigger_type, &trigger, action_type, &action)
                .unwrap();
        self.engine.create_rule(&def, Some(OWNER)).await.unwrap()
    }

    pub async fn dry_run_rule(
        &self,
        trigger_type: &str,
        trigger: Value,
        action_type: &str,
        action: Value,
    ) -> AutomationRule {
        let def =
            RuleDefinition::parse("Dry rule", None, trigger_type, &trigger, action_type, &action)
                .unwrap()
                .with_dry_run(true);
        self.engine.create_rule(&def, Some(OWNER)).await.unwrap()
    }

    /// Pretend the project entered its current stage `days` days before `now`.
    pub fn age_stage(&self, project_id: DbId, now: Timestamp, days: i64) {
        assert!(self.store.backdate_stage_entry(project_id, now - Duration::days(days)));
    }
}

pub fn now() -> Timestamp {
    Utc::now()
}

pub fn notify_action() -> Value {
    json!({ "title": "{project_name}", "message": "Now in {stage}" })
}

/// Preferences that never suppress, whatever day or hour the test runs.
pub fn always_deliver() -> UserPreferences {
    let mut prefs = UserPreferences::default();
    prefs.alerts.weekend_alerts = true;
    prefs
}

pub struct FailingNotifier;

#[async_trait]
impl NotificationSink for FailingNotifier {
    async fn emit(&self, _notification: &NewNotification) -> Result<Notification, StoreError> {
        Err(StoreError::Unavailable("notification service down".into()))
    }
}
