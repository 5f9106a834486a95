//! Each action handler, driven by `stage_enter` rules through the outbox
//! relay.

mod common;

use chrono::Duration;
use serde_json::{json, Value};
use stageflow_core::audit::action_types;
use stageflow_core::notifications::UserPreferences;
use stageflow_core::types::DbId;
use stageflow_db::models::client::CreateClient;
use stageflow_db::models::email::CreateEmailTemplate;
use stageflow_db::models::project::CreateProject;
use stageflow_events::PipelineEvent;

use common::{always_deliver, notify_action, now, Harness, OWNER};

/// A rule firing on entry to stage 6.
async fn on_stage_six(h: &Harness, action_type: &str, action: Value) -> DbId {
    h.rule("stage_enter", json!({ "stage_number": 6 }), action_type, action)
        .await
        .id
}

/// Move the project from 5 to 6 and drain the outbox.
async fn enter_six(h: &Harness, project_id: DbId) {
    h.move_to(project_id, 6).await;
    h.relay.drain_until_idle(now()).await.unwrap();
}

async fn project_at_five(h: &Harness, input: CreateProject) -> DbId {
    let id = h.project_with(input).await.project.id;
    h.move_to(id, 5).await;
    h.mark_all_processed().await;
    id
}

fn only_execution(h: &Harness) -> stageflow_db::models::automation::AutomationExecution {
    let executions = h.store.executions();
    assert_eq!(executions.len(), 1, "expected exactly one execution");
    executions.into_iter().next().unwrap()
}

// ---------------------------------------------------------------------------
// send_notification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notification_prefers_assignee_over_creator() {
    let h = Harness::new();
    h.store.set_preferences(42, always_deliver());
    on_stage_six(&h, "send_notification", notify_action()).await;
    let id = project_at_five(
        &h,
        CreateProject {
            title: "Assigned".into(),
            assigned_to: Some(42),
            created_by: Some(OWNER),
            ..Default::default()
        },
    )
    .await;

    enter_six(&h, id).await;

    let notifications = h.store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, 42);
    assert_eq!(notifications[0].notification_type, "stage_change");
    assert!(notifications[0].message.starts_with("Now in "));
}

#[tokio::test]
async fn notification_without_recipient_fails() {
    let h = Harness::new();
    on_stage_six(&h, "send_notification", notify_action()).await;
    let id = project_at_five(
        &h,
        CreateProject {
            title: "Orphan".into(),
            ..Default::default()
        },
    )
    .await;

    enter_six(&h, id).await;

    let execution = only_execution(&h);
    assert_eq!(execution.status, "failed");
    assert!(execution.error_message.unwrap().contains("No recipient"));
}

#[tokio::test]
async fn muted_notification_type_is_suppressed_but_succeeds() {
    let h = Harness::new();
    let mut prefs = always_deliver();
    prefs.toggles.stage_change = false;
    h.store.set_preferences(OWNER, prefs);
    on_stage_six(&h, "send_notification", notify_action()).await;
    let id = h.project_at("Muted", 5).await;

    enter_six(&h, id).await;

    let execution = only_execution(&h);
    assert_eq!(execution.status, "success");
    let details = execution.details.unwrap();
    assert_eq!(details["suppressed"], true);
    assert_eq!(details["reason"], "type_disabled");
    assert!(h.store.notifications().is_empty());
}

#[tokio::test]
async fn disabled_notifications_are_suppressed() {
    let h = Harness::new();
    h.store.set_preferences(
        OWNER,
        UserPreferences {
            notifications_enabled: false,
            ..always_deliver()
        },
    );
    on_stage_six(&h, "send_notification", notify_action()).await;
    let id = h.project_at("Silent", 5).await;

    enter_six(&h, id).await;

    assert_eq!(
        only_execution(&h).details.unwrap()["reason"],
        "notifications_disabled"
    );
}

// ---------------------------------------------------------------------------
// send_email
// ---------------------------------------------------------------------------

#[tokio::test]
async fn email_is_rendered_and_queued() {
    let h = Harness::new();
    let client = h.store.add_client(&CreateClient {
        name: "Nino".into(),
        email: Some("nino@example.com".into()),
        ..Default::default()
    });
    let template = h.store.add_email_template(&CreateEmailTemplate {
        name: "Development started".into(),
        subject: "{project_name} is in development".into(),
        body: "Hello {client_name}, we moved to {stage}.".into(),
    });
    on_stage_six(&h, "send_email", json!({ "template_id": template.id })).await;
    let id = project_at_five(
        &h,
        CreateProject {
            title: "Storefront".into(),
            client_id: Some(client.id),
            created_by: Some(OWNER),
            ..Default::default()
        },
    )
    .await;

    enter_six(&h, id).await;

    let emails = h.store.emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to_email, "nino@example.com");
    assert_eq!(emails[0].subject, "Storefront is in development");
    assert!(emails[0].body.starts_with("Hello Nino, "));
    assert_eq!(emails[0].status, "pending");
    assert_eq!(emails[0].project_id, Some(id));
}

#[tokio::test]
async fn email_without_client_address_fails() {
    let h = Harness::new();
    let template = h.store.add_email_template(&CreateEmailTemplate {
        name: "Hi".into(),
        subject: "Hi".into(),
        body: "Hi".into(),
    });
    on_stage_six(&h, "send_email", json!({ "template_id": template.id })).await;
    let id = h.project_at("No client", 5).await;

    enter_six(&h, id).await;

    let execution = only_execution(&h);
    assert_eq!(execution.status, "failed");
    assert!(h.store.emails().is_empty());
}

#[tokio::test]
async fn email_with_unknown_template_fails() {
    let h = Harness::new();
    on_stage_six(&h, "send_email", json!({ "template_id": 9999 })).await;
    let id = h.project_at("Templateless", 5).await;

    enter_six(&h, id).await;

    assert!(only_execution(&h)
        .error_message
        .unwrap()
        .contains("template 9999"));
}

// ---------------------------------------------------------------------------
// Tasks, reminders, invoices
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reminder_is_due_after_configured_days() {
    let h = Harness::new();
    on_stage_six(
        &h,
        "create_reminder",
        json!({ "message": "Check on {project_name}", "remind_in_days": 3 }),
    )
    .await;
    let id = h.project_at("Follow up", 5).await;

    enter_six(&h, id).await;

    let tasks = h.store.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, "reminder");
    assert_eq!(tasks[0].title, "Check on Follow up");
    assert_eq!(tasks[0].assigned_to, Some(OWNER));
    let expected = now().date_naive() + Duration::days(3);
    let due = tasks[0].due_date.unwrap();
    assert!((due - expected).num_days().abs() <= 1);
}

#[tokio::test]
async fn invoice_covers_the_outstanding_balance() {
    let h = Harness::new();
    on_stage_six(&h, "generate_invoice", json!({ "due_in_days": 14 })).await;
    let id = project_at_five(
        &h,
        CreateProject {
            title: "Billable".into(),
            budget_cents: Some(10_000),
            created_by: Some(OWNER),
            ..Default::default()
        },
    )
    .await;
    h.stages.record_payment(id, 2_500, None).await.unwrap();
    h.mark_all_processed().await;

    enter_six(&h, id).await;

    let tasks = h.store.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, "invoice");
    assert_eq!(tasks[0].amount_cents, Some(7_500));
}

#[tokio::test]
async fn invoice_without_budget_fails() {
    let h = Harness::new();
    on_stage_six(&h, "generate_invoice", json!({})).await;
    let id = h.project_at("Pro bono", 5).await;

    enter_six(&h, id).await;

    assert_eq!(only_execution(&h).status, "failed");
    assert!(h.store.tasks().is_empty());
}

// ---------------------------------------------------------------------------
// Project edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assign_team_sets_assignee_and_audits() {
    let h = Harness::new();
    on_stage_six(&h, "assign_team", json!({ "user_id": 7 })).await;
    let id = h.project_at("Team up", 5).await;

    enter_six(&h, id).await;

    assert_eq!(h.store.project(id).unwrap().assigned_to, Some(7));
    let entry = h
        .store
        .audit_logs()
        .into_iter()
        .find(|a| a.action_type == action_types::PROJECT_UPDATED)
        .unwrap();
    assert_eq!(entry.entity_id, Some(id));
    assert_eq!(entry.new_values.unwrap()["assigned_to"], 7);
}

#[tokio::test]
async fn flag_opens_custom_alert_with_flag_severity() {
    let h = Harness::new();
    on_stage_six(
        &h,
        "flag_project",
        json!({ "flag_type": "urgent", "message": "Client escalated" }),
    )
    .await;
    let id = h.project_at("Hot", 5).await;

    enter_six(&h, id).await;

    let alerts = h.store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, "custom");
    assert_eq!(alerts[0].severity, "critical");
    assert_eq!(alerts[0].message, "Client escalated");
    assert_eq!(alerts[0].project_id, id);
}

// ---------------------------------------------------------------------------
// move_stage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn automated_move_goes_through_the_recorder() {
    let h = Harness::new();
    let rule = on_stage_six(&h, "move_stage", json!({ "target_stage": 7 })).await;
    let id = h.project_at("Auto", 5).await;

    enter_six(&h, id).await;

    assert_eq!(h.store.project(id).unwrap().stage_number, 7);
    let latest = h.store.history_for(id).pop().unwrap();
    assert_eq!(latest.from_stage_number, Some(6));
    assert_eq!(latest.to_stage_number, 7);
    assert_eq!(latest.changed_by, None);
    assert!(latest
        .notes
        .unwrap()
        .starts_with(&format!("Automation rule #{}", rule)));

    let moved = h.store.events().pop().unwrap();
    assert_eq!(moved.cascade_depth, 1);
    assert!(moved.processed_at.is_some());
}

#[tokio::test]
async fn automated_backward_move_needs_override() {
    let h = Harness::new();
    on_stage_six(&h, "move_stage", json!({ "target_stage": 3 })).await;
    let id = h.project_at("Stay", 5).await;

    enter_six(&h, id).await;

    assert_eq!(h.store.project(id).unwrap().stage_number, 6);
    let execution = only_execution(&h);
    assert_eq!(execution.status, "failed");
    assert!(execution.error_message.unwrap().contains("allow_backward"));
}

#[tokio::test]
async fn automated_backward_move_with_override_commits() {
    let h = Harness::new();
    on_stage_six(
        &h,
        "move_stage",
        json!({ "target_stage": 3, "allow_backward": true }),
    )
    .await;
    let id = h.project_at("Rewind", 5).await;

    enter_six(&h, id).await;

    assert_eq!(h.store.project(id).unwrap().stage_number, 3);
}

#[tokio::test]
async fn cascade_stops_at_the_depth_limit() {
    let h = Harness::with_max_depth(2);
    for stage in 2..=4 {
        h.rule(
            "stage_enter",
            json!({ "stage_number": stage }),
            "move_stage",
            json!({ "target_stage": stage + 1 }),
        )
        .await;
    }
    let id = h.project_at("Chain", 1).await;
    h.move_to(id, 2).await;

    let drained = h.relay.drain_until_idle(now()).await.unwrap();

    // 2 -> 3 at depth 1, 3 -> 4 at depth 2, 4 -> 5 refused.
    assert_eq!(h.store.project(id).unwrap().stage_number, 4);
    assert_eq!(drained.evaluation.succeeded, 2);
    assert_eq!(drained.evaluation.failed, 1);
    let failed = h
        .store
        .executions()
        .into_iter()
        .find(|e| e.status == "failed")
        .unwrap();
    assert!(failed.error_message.unwrap().contains("cascade depth 3"));
    assert!(h.store.events().iter().all(|e| e.processed_at.is_some()));
}

#[tokio::test]
async fn corrupt_cascade_depth_is_refused() {
    let h = Harness::new();
    h.rule(
        "stage_enter",
        json!({ "stage_number": 2 }),
        "move_stage",
        json!({ "target_stage": 3 }),
    )
    .await;
    let id = h.project_at("Chain", 2).await;
    let row = h.store.events().pop().unwrap();
    let event = PipelineEvent::try_from(&row).unwrap().with_depth(i16::MAX);

    let report = h.engine.process_event(&event, now()).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(h.store.project(id).unwrap().stage_number, 2);
    let failed = h.store.executions().pop().unwrap();
    assert!(failed
        .error_message
        .unwrap()
        .contains(&format!("cascade depth {}", i16::MAX)));
}
