//! Rule matching, de-duplication, and dry runs across the three engine
//! entry points.

mod common;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use stageflow_core::audit::action_types;
use stageflow_db::models::automation::CreateAutomationRule;
use stageflow_events::PipelineEvent;
use stageflow_pipeline::{PipelineError, PipelineStore, StoreError};

use common::{notify_action, now, Harness, OWNER};

fn stuck_in_five() -> serde_json::Value {
    json!({ "stage_number": 5, "duration_days": 7 })
}

// ---------------------------------------------------------------------------
// stage_duration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stage_duration_fires_after_threshold_only() {
    let h = Harness::new();
    let now = now();
    let rule = h
        .rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    let fresh = h.project_at("Fresh", 5).await;
    let stale = h.project_at("Stale", 5).await;
    h.age_stage(fresh, now, 6);
    h.age_stage(stale, now, 8);

    let report = h.engine.sweep(now).await.unwrap();

    assert_eq!(report.matched, 1);
    assert_eq!(report.succeeded, 1);
    let executions = h.store.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].rule_id, rule.id);
    assert_eq!(executions[0].project_id, Some(stale));
    assert_eq!(executions[0].status, "success");

    let notifications = h.store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, OWNER);
    assert_eq!(notifications[0].title, "Stale");
    assert_eq!(notifications[0].notification_type, "project_stuck");
    assert_eq!(notifications[0].related_project_id, Some(stale));
}

#[tokio::test]
async fn repeated_sweep_adds_no_executions() {
    let h = Harness::new();
    let now = now();
    h.rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    let id = h.project_at("Stale", 5).await;
    h.age_stage(id, now, 8);

    h.engine.sweep(now).await.unwrap();
    let second = h.engine.sweep(now).await.unwrap();

    assert_eq!(second.executions(), 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(h.store.executions().len(), 1);
    assert_eq!(h.store.notifications().len(), 1);
}

#[tokio::test]
async fn reentering_the_stage_resets_eligibility() {
    let h = Harness::new();
    let now = now();
    h.rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    let id = h.project_at("Loop", 5).await;
    h.age_stage(id, now, 8);
    h.engine.sweep(now).await.unwrap();

    h.move_to(id, 6).await;
    h.move_to(id, 5).await;
    h.age_stage(id, now, 9);
    let report = h.engine.sweep(now).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(h.store.executions().len(), 2);
}

#[tokio::test]
async fn fired_rule_records_last_trigger_and_audit() {
    let h = Harness::new();
    let now = now();
    let rule = h
        .rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    let id = h.project_at("Stale", 5).await;
    h.age_stage(id, now, 8);

    h.engine.sweep(now).await.unwrap();

    assert_eq!(h.store.rule(rule.id).unwrap().last_triggered_at, Some(now));
    let audit = h
        .store
        .audit_logs()
        .into_iter()
        .find(|a| a.action_type == action_types::AUTOMATION_TRIGGERED)
        .unwrap();
    assert_eq!(audit.entity_id, Some(rule.id));
    assert_eq!(audit.new_values.unwrap()["project_id"], id);
}

// ---------------------------------------------------------------------------
// Dry runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dry_run_logs_without_side_effects() {
    let h = Harness::new();
    let now = now();
    h.dry_run_rule(
        "stage_duration",
        stuck_in_five(),
        "move_stage",
        json!({ "target_stage": 6 }),
    )
    .await;
    let id = h.project_at("Careful", 5).await;
    h.age_stage(id, now, 8);
    let history_before = h.store.history_for(id).len();

    let report = h.engine.sweep(now).await.unwrap();

    assert_eq!(report.dry_runs, 1);
    let executions = h.store.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, "skipped");
    assert!(executions[0].dry_run);
    assert_eq!(executions[0].details.as_ref().unwrap()["action_type"], "move_stage");

    assert_eq!(h.store.project(id).unwrap().stage_number, 5);
    assert_eq!(h.store.history_for(id).len(), history_before);
    assert!(h.store.notifications().is_empty());
    assert!(h
        .store
        .audit_logs()
        .iter()
        .all(|a| a.action_type != action_types::AUTOMATION_TRIGGERED));
}

#[tokio::test]
async fn rule_switched_live_after_dry_run_fires_for_real() {
    let h = Harness::new();
    let now = now();
    let rule = h
        .dry_run_rule(
            "stage_duration",
            stuck_in_five(),
            "move_stage",
            json!({ "target_stage": 6 }),
        )
        .await;
    let id = h.project_at("Careful", 5).await;
    h.age_stage(id, now, 8);
    h.engine.sweep(now).await.unwrap();

    assert!(h.store.set_rule_dry_run(rule.id, false));
    let report = h.engine.sweep(now).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(h.store.project(id).unwrap().stage_number, 6);
    let executions = h.store.executions();
    assert_eq!(executions.len(), 2);
    assert_ne!(executions[0].dedup_key, executions[1].dedup_key);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_action_is_logged_and_other_rules_still_run() {
    let h = Harness::with_failing_notifier();
    let now = now();
    h.rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    h.rule(
        "stage_duration",
        stuck_in_five(),
        "create_task",
        json!({ "title": "Chase {client_name}" }),
    )
    .await;
    let id = h.project_at("Stale", 5).await;
    h.age_stage(id, now, 8);

    let report = h.engine.sweep(now).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    let failed = h
        .store
        .executions()
        .into_iter()
        .find(|e| e.status == "failed")
        .unwrap();
    assert!(failed
        .error_message
        .unwrap()
        .contains("notification service down"));
    assert_eq!(h.store.tasks().len(), 1);
}

#[tokio::test]
async fn failed_fire_is_not_retried_on_the_next_sweep() {
    let h = Harness::with_failing_notifier();
    let now = now();
    h.rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    let id = h.project_at("Stale", 5).await;
    h.age_stage(id, now, 8);

    h.engine.sweep(now).await.unwrap();
    let second = h.engine.sweep(now).await.unwrap();

    assert_eq!(second.duplicates, 1);
    assert_eq!(h.store.executions().len(), 1);
}

#[tokio::test]
async fn invalid_stored_rule_is_skipped() {
    let h = Harness::new();
    let now = now();
    h.store
        .create_rule(&CreateAutomationRule {
            name: "Broken".into(),
            description: None,
            trigger_type: "stage_duration".into(),
            trigger_config: json!({ "stage_number": 5 }),
            action_type: "send_notification".into(),
            action_config: notify_action(),
            is_active: true,
            dry_run: false,
            created_by: None,
        })
        .await
        .unwrap();
    h.rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    let id = h.project_at("Stale", 5).await;
    h.age_stage(id, now, 8);

    let report = h.engine.sweep(now).await.unwrap();

    assert_eq!(report.rules_evaluated, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(h.store.executions().len(), 1);
}

// ---------------------------------------------------------------------------
// Edge triggers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stage_enter_fires_once_per_transition() {
    let h = Harness::new();
    let now = now();
    let rule = h
        .rule(
            "stage_enter",
            json!({ "stage_number": 6 }),
            "create_task",
            json!({ "title": "Kick off {project_name}", "due_in_days": 2 }),
        )
        .await;
    let id = h.project_at("Build", 5).await;
    h.move_to(id, 6).await;

    let drained = h.relay.drain(now).await.unwrap();
    assert_eq!(drained.processed, 1);
    assert_eq!(drained.evaluation.succeeded, 1);

    let tasks = h.store.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, "task");
    assert_eq!(tasks[0].title, "Kick off Build");
    assert_eq!(tasks[0].created_by_rule_id, Some(rule.id));
    assert_eq!(
        tasks[0].due_date,
        Some(now.date_naive() + chrono::Duration::days(2))
    );

    // Redelivering the same event, as the bus would, is a duplicate.
    let row = h.store.events().pop().unwrap();
    let event = PipelineEvent::try_from(&row).unwrap();
    let replay = h.engine.process_event(&event, now).await.unwrap();
    assert_eq!(replay.duplicates, 1);
    assert_eq!(h.store.tasks().len(), 1);
}

#[tokio::test]
async fn stage_enter_ignores_other_stages() {
    let h = Harness::new();
    h.rule(
        "stage_enter",
        json!({ "stage_number": 6 }),
        "send_notification",
        notify_action(),
    )
    .await;
    let id = h.project_at("Build", 5).await;
    h.move_to(id, 7).await;

    let drained = h.relay.drain(now()).await.unwrap();
    assert_eq!(drained.evaluation.matched, 0);
    assert!(h.store.executions().is_empty());
}

#[tokio::test]
async fn project_created_fires_on_creation() {
    let h = Harness::new();
    h.rule("project_created", json!({}), "send_notification", notify_action())
        .await;
    let created = h.project("Fresh lead").await;

    let drained = h.relay.drain(now()).await.unwrap();

    assert_eq!(drained.evaluation.succeeded, 1);
    let notifications = h.store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, "project_created");
    assert_eq!(notifications[0].related_project_id, Some(created.project.id));
}

#[tokio::test]
async fn payment_received_fires_only_on_the_crossing() {
    let h = Harness::new();
    let now = now();
    h.rule("payment_received", json!({}), "send_notification", notify_action())
        .await;
    let id = h.project_with_budget("Invoice me", None, 10_000).await;
    h.mark_all_processed().await;

    h.stages.record_payment(id, 4_000, None).await.unwrap();
    assert_eq!(h.relay.drain(now).await.unwrap().evaluation.matched, 0);

    h.stages.record_payment(id, 6_000, None).await.unwrap();
    assert_eq!(h.relay.drain(now).await.unwrap().evaluation.succeeded, 1);

    h.stages.record_payment(id, 500, None).await.unwrap();
    assert_eq!(h.relay.drain(now).await.unwrap().evaluation.matched, 0);

    assert_eq!(h.store.executions().len(), 1);
    assert_eq!(h.store.notifications()[0].notification_type, "payment_received");
}

#[tokio::test]
async fn condition_met_fires_once_per_dwell() {
    let h = Harness::new();
    let now = now();
    h.rule(
        "condition_met",
        json!({ "field": "budget", "operator": "gte", "value": 5000 }),
        "flag_project",
        json!({ "flag_type": "review" }),
    )
    .await;
    let big = h.project_with_budget("Big", None, 8_000).await;
    h.project_with_budget("Small", None, 1_000).await;
    h.mark_all_processed().await;

    h.engine.sweep(now).await.unwrap();
    h.engine.sweep(now).await.unwrap();

    let alerts = h.store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].project_id, big);
}

// ---------------------------------------------------------------------------
// Scheduled ticks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scheduled_rule_fires_once_per_window() {
    let h = Harness::new();
    h.rule(
        "time_scheduled",
        json!({ "schedule": "0 9 * * *" }),
        "send_notification",
        json!({ "title": "Digest", "message": "Daily digest", "user_id": OWNER }),
    )
    .await;
    let start = Utc.with_ymd_and_hms(2026, 3, 10, 8, 55, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 5, 0).unwrap();

    let first = h.engine.tick(start, now).await.unwrap();
    let again = h.engine.tick(start, now).await.unwrap();

    assert_eq!(first.succeeded, 1);
    assert_eq!(again.duplicates, 1);
    let notifications = h.store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].related_project_id, None);
    assert_eq!(notifications[0].notification_type, "system_alert");
}

#[tokio::test]
async fn scheduled_rule_outside_window_does_not_fire() {
    let h = Harness::new();
    h.rule(
        "time_scheduled",
        json!({ "schedule": "0 9 * * *" }),
        "send_notification",
        json!({ "title": "Digest", "message": "Daily digest", "user_id": OWNER }),
    )
    .await;
    let start = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap();

    let report = h.engine.tick(start, now).await.unwrap();
    assert_eq!(report.matched, 0);
}

#[tokio::test]
async fn scheduled_project_action_fails_without_a_project() {
    let h = Harness::new();
    h.rule(
        "time_scheduled",
        json!({ "schedule": "*/15 * * * *" }),
        "create_task",
        json!({ "title": "Weekly review" }),
    )
    .await;
    let start = Utc.with_ymd_and_hms(2026, 3, 10, 9, 1, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 16, 0).unwrap();

    let report = h.engine.tick(start, now).await.unwrap();

    assert_eq!(report.failed, 1);
    let execution = h.store.executions().pop().unwrap();
    assert_eq!(execution.project_id, None);
    assert!(execution.error_message.unwrap().contains("requires a project"));
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

fn unprocessed(h: &Harness) -> usize {
    h.store
        .events()
        .iter()
        .filter(|e| e.processed_at.is_none())
        .count()
}

#[tokio::test]
async fn transient_claim_failure_keeps_the_event_for_retry() {
    let h = Harness::new();
    let now = now();
    h.rule(
        "stage_enter",
        json!({ "stage_number": 2 }),
        "flag_project",
        json!({ "flag_type": "attention" }),
    )
    .await;
    let id = h.project_at("Retry", 1).await;
    h.move_to(id, 2).await;
    h.store.fail_next_claims(1);

    let first = h.relay.drain_until_idle(now).await;

    assert_matches!(first, Err(PipelineError::Store(StoreError::Unavailable(_))));
    assert_eq!(unprocessed(&h), 1);
    assert!(h.store.executions().is_empty());
    assert!(h.store.alerts().is_empty());

    let retry = h.relay.drain_until_idle(now).await.unwrap();

    assert_eq!(retry.processed, 1);
    assert_eq!(retry.evaluation.succeeded, 1);
    assert_eq!(unprocessed(&h), 0);
    assert_eq!(h.store.executions().len(), 1);
    assert_eq!(h.store.alerts().len(), 1);
}

#[tokio::test]
async fn failed_execution_write_releases_the_claim() {
    let h = Harness::new();
    let now = now();
    let rule = h
        .dry_run_rule(
            "project_created",
            json!({}),
            "create_task",
            json!({ "title": "Welcome" }),
        )
        .await;
    h.project("Fresh").await;
    h.store.fail_next_execution_writes(1);

    assert!(h.relay.drain(now).await.is_err());
    assert_eq!(unprocessed(&h), 1);
    assert!(h.store.executions().is_empty());

    let retry = h.relay.drain(now).await.unwrap();

    assert_eq!(retry.evaluation.dry_runs, 1);
    assert_eq!(retry.evaluation.duplicates, 0);
    let executions = h.store.executions();
    assert_eq!(executions.len(), 1);
    assert!(h.store.is_claimed(rule.id, &executions[0].dedup_key));
}

#[tokio::test]
async fn failed_sweep_match_is_picked_up_by_the_next_sweep() {
    let h = Harness::new();
    let now = now();
    h.rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    let id = h.project_at("Stale", 5).await;
    h.age_stage(id, now, 8);
    h.store.fail_next_claims(1);

    let first = h.engine.sweep(now).await.unwrap();
    let second = h.engine.sweep(now).await.unwrap();

    assert_eq!(first.errors, 1);
    assert_eq!(second.succeeded, 1);
    assert_eq!(h.store.notifications().len(), 1);
}

// ---------------------------------------------------------------------------
// Overlapping evaluation
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bus_and_relay_racing_on_one_event_fire_once() {
    let h = Harness::new();
    let now = now();
    h.rule(
        "stage_enter",
        json!({ "stage_number": 6 }),
        "create_task",
        json!({ "title": "Kick off {project_name}" }),
    )
    .await;
    let id = h.project_at("Build", 5).await;
    h.move_to(id, 6).await;
    let row = h.store.events().pop().unwrap();
    let event = PipelineEvent::try_from(&row).unwrap();

    let deliver = |event: PipelineEvent| {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.process_event(&event, now).await })
    };
    let relay = h.relay.clone();
    let (bus, redelivered, drained) = tokio::join!(
        deliver(event.clone()),
        deliver(event),
        tokio::spawn(async move { relay.drain(now).await }),
    );

    let reports = [
        bus.unwrap().unwrap(),
        redelivered.unwrap().unwrap(),
        drained.unwrap().unwrap().evaluation,
    ];
    assert_eq!(reports.iter().map(|r| r.succeeded).sum::<usize>(), 1);
    assert_eq!(reports.iter().map(|r| r.duplicates).sum::<usize>(), 2);
    assert_eq!(h.store.executions().len(), 1);
    assert_eq!(h.store.tasks().len(), 1);
    assert_eq!(unprocessed(&h), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_sweeps_fire_once() {
    let h = Harness::new();
    let now = now();
    h.rule("stage_duration", stuck_in_five(), "send_notification", notify_action())
        .await;
    let id = h.project_at("Stale", 5).await;
    h.age_stage(id, now, 8);

    let sweep = || {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.sweep(now).await })
    };
    let (a, b, c) = tokio::join!(sweep(), sweep(), sweep());

    let reports = [a.unwrap().unwrap(), b.unwrap().unwrap(), c.unwrap().unwrap()];
    assert_eq!(reports.iter().map(|r| r.succeeded).sum::<usize>(), 1);
    assert_eq!(reports.iter().map(|r| r.duplicates).sum::<usize>(), 2);
    assert_eq!(h.store.executions().len(), 1);
    assert_eq!(h.store.notifications().len(), 1);
}
