//! Automation rule evaluation.
//!
//! [`AutomationEngine`] has three entry points sharing one matcher
//! ([`match_trigger`]) and one firing path:
//!
//! - [`process_event`](AutomationEngine::process_event) for a committed
//!   change (edge triggers, plus level triggers re-checked right away),
//! - [`sweep`](AutomationEngine::sweep) for level triggers over every project,
//! - [`tick`](AutomationEngine::tick) for scheduled, project-less triggers.
//!
//! Every satisfied trigger is claimed under its de-duplication key before
//! any side effect, so overlapping invocations fire a rule at most once per
//! satisfaction event.

use serde::Serialize;
use stageflow_core::audit::{action_types, entity_types, AuditEntry};
use stageflow_core::automation::{Action, ExecutionStatus, RuleDefinition, Trigger, TriggerType};
use stageflow_core::evaluation::{match_trigger, Occasion, TriggerMatch};
use stageflow_core::project::ProjectState;
use stageflow_core::types::{DbId, Timestamp};
use stageflow_db::models::automation::{AutomationRule, CreateAutomationRule, NewExecution};
use stageflow_events::PipelineEvent;

use crate::actions::ActionExecutor;
use crate::error::PipelineError;
use crate::stage_service::StageService;
use crate::store::PipelineContext;

/// Default limit on chained rule-driven stage moves.
pub const DEFAULT_MAX_CASCADE_DEPTH: i16 = 5;

/// Stored trigger type names selected by one of the [`TriggerType`]
/// evaluation-path predicates.
fn trigger_types(select: fn(&TriggerType) -> bool) -> Vec<&'static str> {
    TriggerType::ALL
        .into_iter()
        .filter(|t| select(t))
        .map(|t| t.as_str())
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub max_cascade_depth: i16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

// ---------------------------------------------------------------------------
// Loaded rule
// ---------------------------------------------------------------------------

/// An active rule whose configs parsed into typed form.
#[derive(Debug, Clone)]
pub struct LoadedRule {
    pub id: DbId,
    pub name: String,
    pub trigger: Trigger,
    pub action: Action,
    pub dry_run: bool,
}

impl LoadedRule {
    /// Parse a stored rule. Mismatched or incomplete configs yield `None`;
    /// such a rule never matches.
    pub fn from_row(row: &AutomationRule) -> Option<Self> {
        match RuleDefinition::parse(
            &row.name,
            row.description.clone(),
            &row.trigger_type,
            &row.trigger_config,
            &row.action_type,
            &row.action_config,
        ) {
            Ok(def) => Some(Self {
                id: row.id,
                name: def.name,
                trigger: def.trigger,
                action: def.action,
                dry_run: row.dry_run,
            }),
            Err(e) => {
                tracing::warn!(
                    rule_id = row.id,
                    trigger_type = %row.trigger_type,
                    action_type = %row.action_type,
                    error = %e,
                    "Skipping automation rule with invalid config"
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Counters for one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    pub rules_evaluated: usize,
    pub matched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dry_runs: usize,
    /// Matches already claimed by an earlier pass.
    pub duplicates: usize,
    /// Fires aborted by a store failure.
    pub errors: usize,
}

impl EvaluationReport {
    pub fn merge(&mut self, other: EvaluationReport) {
        self.rules_evaluated += other.rules_evaluated;
        self.matched += other.matched;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.dry_runs += other.dry_runs;
        self.duplicates += other.duplicates;
        self.errors += other.errors;
    }

    /// Executions written by this pass.
    pub fn executions(&self) -> usize {
        self.succeeded + self.failed + self.dry_runs
    }
}

enum FireOutcome {
    Duplicate,
    DryRun,
    Succeeded,
    Failed,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AutomationEngine {
    ctx: PipelineContext,
    executor: ActionExecutor,
}

impl AutomationEngine {
    pub fn new(ctx: PipelineContext, config: EngineConfig) -> Self {
        let executor = ActionExecutor::new(StageService::new(ctx.clone()), config.max_cascade_depth);
        Self { ctx, executor }
    }

    /// Validate and persist a new rule, failing on the first bad field.
    pub async fn create_rule(
        &self,
        definition: &RuleDefinition,
        created_by: Option<DbId>,
    ) -> Result<AutomationRule, PipelineError> {
        let rule = self
            .ctx
            .store
            .create_rule(&CreateAutomationRule::from_definition(definition, created_by))
            .await?;
        tracing::info!(
            rule_id = rule.id,
            trigger_type = %rule.trigger_type,
            action_type = %rule.action_type,
            dry_run = rule.dry_run,
            "Automation rule created"
        );
        Ok(rule)
    }

    async fn load_rules(&self, trigger_types: &[&str]) -> Result<Vec<LoadedRule>, PipelineError> {
        let rows = self.ctx.store.active_rules(Some(trigger_types)).await?;
        Ok(rows.iter().filter_map(LoadedRule::from_row).collect())
    }

    // ---- Entry points ----

    /// Evaluate every relevant rule against one committed change.
    ///
    /// Every rule is evaluated even when one of them hits a store failure.
    /// The first such failure is returned afterwards so the caller keeps the
    /// event for a retry; rules that did fire are claimed and come back as
    /// duplicates.
    pub async fn process_event(
        &self,
        event: &PipelineEvent,
        now: Timestamp,
    ) -> Result<EvaluationReport, PipelineError> {
        let mut report = EvaluationReport::default();
        let Some(project) = self.ctx.store.project_state(event.project_id).await? else {
            tracing::warn!(
                event_id = event.id,
                project_id = event.project_id,
                "Event refers to a missing project, skipping"
            );
            return Ok(report);
        };

        let occasion = Occasion::Change {
            change: &event.change,
            project: &project,
            now,
        };
        let mut first_error = None;
        for rule in self.load_rules(&trigger_types(TriggerType::on_change)).await? {
            report.rules_evaluated += 1;
            if let Err(e) = self
                .evaluate(&rule, &occasion, event.cascade_depth, now, &mut report)
                .await
            {
                first_error.get_or_insert(e);
            }
        }

        tracing::debug!(
            event_id = event.id,
            event_type = event.event_type(),
            project_id = event.project_id,
            matched = report.matched,
            errors = report.errors,
            "Event evaluated"
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Re-check level triggers against every project.
    pub async fn sweep(&self, now: Timestamp) -> Result<EvaluationReport, PipelineError> {
        let mut report = EvaluationReport::default();
        let rules = self.load_rules(&trigger_types(TriggerType::is_swept)).await?;
        if rules.is_empty() {
            return Ok(report);
        }

        let projects = self.ctx.store.project_states(true).await?;
        for project in &projects {
            let occasion = Occasion::Sweep { project, now };
            for rule in &rules {
                report.rules_evaluated += 1;
                // A failed match stays unclaimed and the next sweep sees it again.
                let _ = self.evaluate(rule, &occasion, 0, now, &mut report).await;
            }
        }

        tracing::info!(
            projects = projects.len(),
            rules = rules.len(),
            matched = report.matched,
            succeeded = report.succeeded,
            failed = report.failed,
            "Automation sweep finished"
        );
        Ok(report)
    }

    /// Fire scheduled rules with an occurrence in `(window_start, now]`.
    ///
    /// Like [`process_event`](Self::process_event), a store failure is
    /// returned after every rule was tried, so the window can be ticked again.
    pub async fn tick(
        &self,
        window_start: Timestamp,
        now: Timestamp,
    ) -> Result<EvaluationReport, PipelineError> {
        let mut report = EvaluationReport::default();
        let occasion = Occasion::Tick { window_start, now };
        let mut first_error = None;
        for rule in self.load_rules(&trigger_types(TriggerType::is_scheduled)).await? {
            report.rules_evaluated += 1;
            if let Err(e) = self.evaluate(&rule, &occasion, 0, now, &mut report).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    // ---- Firing ----

    async fn evaluate(
        &self,
        rule: &LoadedRule,
        occasion: &Occasion<'_>,
        cascade_depth: i16,
        now: Timestamp,
        report: &mut EvaluationReport,
    ) -> Result<(), PipelineError> {
        let Some(hit) = match_trigger(&rule.trigger, occasion) else {
            return Ok(());
        };
        report.matched += 1;

        let outcome = match self
            .fire(rule, &hit, occasion.project(), cascade_depth, now)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                report.errors += 1;
                tracing::error!(
                    rule_id = rule.id,
                    dedup_key = %hit.dedup_key,
                    error = %e,
                    "Failed to fire automation rule"
                );
                return Err(e);
            }
        };
        match outcome {
            FireOutcome::Duplicate => report.duplicates += 1,
            FireOutcome::DryRun => report.dry_runs += 1,
            FireOutcome::Succeeded => report.succeeded += 1,
            FireOutcome::Failed => report.failed += 1,
        }
        Ok(())
    }

    /// Undo a claim whose execution row could not be written, so a retry of
    /// the same satisfaction event fires instead of skipping as a duplicate.
    async fn release_claim(&self, rule_id: DbId, key: &str) {
        if let Err(e) = self.ctx.store.release_trigger(rule_id, key).await {
            tracing::error!(
                rule_id,
                dedup_key = %key,
                error = %e,
                "Failed to release trigger claim"
            );
        }
    }

    async fn fire(
        &self,
        rule: &LoadedRule,
        hit: &TriggerMatch,
        project: Option<&ProjectState>,
        cascade_depth: i16,
        now: Timestamp,
    ) -> Result<FireOutcome, PipelineError> {
        let key = hit.claim_key(rule.dry_run);
        if !self
            .ctx
            .store
            .claim_trigger(rule.id, &key, hit.project_id)
            .await?
        {
            tracing::debug!(rule_id = rule.id, dedup_key = %key, "Already fired, skipping");
            return Ok(FireOutcome::Duplicate);
        }

        if rule.dry_run {
            let recorded = self
                .ctx
                .store
                .record_execution(&NewExecution {
                    rule_id: rule.id,
                    project_id: hit.project_id,
                    dedup_key: key.clone(),
                    status: ExecutionStatus::Skipped.as_str().to_string(),
                    dry_run: true,
                    details: Some(serde_json::json!({
                        "dry_run": true,
                        "action_type": rule.action.action_type().as_str(),
                        "action_config": rule.action.to_config(),
                    })),
                    error_message: None,
                })
                .await;
            if let Err(e) = recorded {
                self.release_claim(rule.id, &key).await;
                return Err(e.into());
            }
            tracing::info!(rule_id = rule.id, dedup_key = %key, "Dry-run rule matched");
            return Ok(FireOutcome::DryRun);
        }

        let result = self.executor.execute(rule, project, cascade_depth, now).await;
        let (status, details, error_message) = match &result {
            Ok(details) => (ExecutionStatus::Success, Some(details.clone()), None),
            Err(e) => (ExecutionStatus::Failed, None, Some(e.to_string())),
        };

        let recorded = self
            .ctx
            .store
            .record_execution(&NewExecution {
                rule_id: rule.id,
                project_id: hit.project_id,
                dedup_key: key.clone(),
                status: status.as_str().to_string(),
                dry_run: false,
                details,
                error_message: error_message.clone(),
            })
            .await;
        if let Err(e) = recorded {
            self.release_claim(rule.id, &key).await;
            return Err(e.into());
        }

        if let Err(e) = self.ctx.store.touch_rule(rule.id, now).await {
            tracing::warn!(rule_id = rule.id, error = %e, "Failed to update last_triggered_at");
        }

        self.ctx
            .audit_quietly(
                &AuditEntry::new(action_types::AUTOMATION_TRIGGERED, entity_types::AUTOMATION)
                    .on(rule.id)
                    .with_new(serde_json::json!({
                        "rule_name": rule.name,
                        "trigger_type": rule.trigger.trigger_type().as_str(),
                        "action_type": rule.action.action_type().as_str(),
                        "project_id": hit.project_id,
                        "dedup_key": key,
                        "status": status.as_str(),
                    })),
            )
            .await;

        match error_message {
            None => {
                tracing::info!(rule_id = rule.id, dedup_key = %key, "Automation rule fired");
                Ok(FireOutcome::Succeeded)
            }
            Some(error) => {
                tracing::warn!(rule_id = rule.id, dedup_key = %key, %error, "Automation action failed");
                Ok(FireOutcome::Failed)
            }
        }
    }
}
