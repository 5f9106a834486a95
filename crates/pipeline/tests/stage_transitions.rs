//! Stage transitions, project creation, and payments through
//! [`StageService`] against the in-memory store.

mod common;

use assert_matches::assert_matches;
use stageflow_core::audit::action_types;
use stageflow_core::error::CoreError;
use stageflow_core::evaluation::Change;
use stageflow_core::stages;
use stageflow_db::models::project::CreateProject;
use stageflow_pipeline::{PipelineError, StoreError, TransitionRequest};

use common::{Harness, OWNER};

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_project_has_single_initial_history_entry() {
    let h = Harness::new();
    let created = h.project("Landing page").await;

    let history = h.store.history_for(created.project.id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_stage, None);
    assert_eq!(history[0].from_stage_number, None);
    assert_eq!(history[0].to_stage, "დასაწყები");
    assert_eq!(history[0].to_stage_number, 1);
    assert_eq!(created.project.stage_number, 1);
}

#[tokio::test]
async fn creation_writes_outbox_event_and_audit_entry() {
    let h = Harness::new();
    let created = h.project("Shop").await;

    let events = h.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, created.event_id);
    assert_eq!(events[0].event_type, "project_created");
    assert_eq!(events[0].cascade_depth, 0);

    let audit = h.store.audit_logs();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action_type, action_types::PROJECT_CREATED);
    assert_eq!(audit[0].user_id, Some(OWNER));
}

#[tokio::test]
async fn blank_title_is_rejected() {
    let h = Harness::new();
    let err = h
        .stages
        .create_project(&CreateProject {
            title: "   ".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
    assert!(h.store.events().is_empty());
}

#[tokio::test]
async fn negative_budget_is_rejected() {
    let h = Harness::new();
    let err = h
        .stages
        .create_project(&CreateProject {
            title: "Refund".into(),
            budget_cents: Some(-1),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Forward and backward policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forward_move_commits_without_confirmation() {
    let h = Harness::new();
    let id = h.project_at("CRM", 5).await;

    let change = h
        .stages
        .request_transition(&TransitionRequest::new(id, 6).by(OWNER))
        .await
        .unwrap();

    assert_eq!(change.history.from_stage_number, Some(5));
    assert_eq!(change.history.to_stage_number, 6);
    assert_eq!(change.history.changed_by, Some(OWNER));
    let project = h.store.project(id).unwrap();
    assert_eq!(project.stage_number, 6);
    assert_eq!(project.current_stage, stages::by_number(6).unwrap().name);
}

#[tokio::test]
async fn backward_move_without_confirmation_changes_nothing() {
    let h = Harness::new();
    let id = h.project_at("Portal", 10).await;
    let history_before = h.store.history_for(id);
    let events_before = h.store.events().len();

    let err = h
        .stages
        .request_transition(&TransitionRequest::new(id, 3))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        PipelineError::Core(CoreError::ConfirmationRequired { from: 10, to: 3 })
    );
    assert_eq!(h.store.project(id).unwrap().stage_number, 10);
    assert_eq!(h.store.history_for(id).len(), history_before.len());
    assert_eq!(h.store.events().len(), events_before);
}

#[tokio::test]
async fn confirmed_backward_move_commits() {
    let h = Harness::new();
    let id = h.project_at("Portal", 10).await;

    let change = h
        .stages
        .request_transition(&TransitionRequest::new(id, 3).confirmed())
        .await
        .unwrap();

    assert_eq!(change.history.from_stage_number, Some(10));
    assert_eq!(change.history.to_stage_number, 3);
    assert_eq!(h.store.project(id).unwrap().stage_number, 3);
}

#[tokio::test]
async fn same_stage_is_a_no_op_error() {
    let h = Harness::new();
    let id = h.project_at("Blog", 4).await;
    let err = h
        .stages
        .request_transition(&TransitionRequest::new(id, 4))
        .await
        .unwrap_err();
    assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
}

#[tokio::test]
async fn out_of_range_target_is_rejected() {
    let h = Harness::new();
    let id = h.project_at("Blog", 2).await;
    for target in [0, 19] {
        let err = h
            .stages
            .request_transition(&TransitionRequest::new(id, target))
            .await
            .unwrap_err();
        assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
    }
    assert_eq!(h.store.history_for(id).len(), 2);
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let h = Harness::new();
    let err = h
        .stages
        .request_transition(&TransitionRequest::new(404, 2))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        PipelineError::Core(CoreError::NotFound { entity: "Project", id: 404 })
    );
}

// ---------------------------------------------------------------------------
// Invariants after a series of moves
// ---------------------------------------------------------------------------

#[tokio::test]
async fn project_always_matches_latest_history_entry() {
    let h = Harness::new();
    let id = h.project("Wiki").await.project.id;

    for target in [3, 7, 5, 12, 18, 16] {
        h.move_to(id, target).await;
        let project = h.store.project(id).unwrap();
        let latest = h.store.history_for(id).pop().unwrap();
        assert_eq!(latest.to_stage_number, project.stage_number);
        assert_eq!(latest.to_stage, project.current_stage);
        assert_eq!(
            stages::by_name(&project.current_stage).map(|s| s.number),
            Some(project.stage_number)
        );
    }
}

#[tokio::test]
async fn completion_date_follows_the_final_stage() {
    let h = Harness::new();
    let id = h.project_at("App", 17).await;

    h.move_to(id, 18).await;
    assert!(h.store.project(id).unwrap().completion_date.is_some());

    h.move_to(id, 17).await;
    assert_eq!(h.store.project(id).unwrap().completion_date, None);
}

#[tokio::test]
async fn transition_event_carries_cascade_depth() {
    let h = Harness::new();
    let id = h.project_at("Docs", 2).await;

    let change = h
        .stages
        .request_transition(&TransitionRequest {
            cascade_depth: 2,
            ..TransitionRequest::new(id, 3)
        })
        .await
        .unwrap();

    let row = h
        .store
        .events()
        .into_iter()
        .find(|e| e.id == change.event_id)
        .unwrap();
    assert_eq!(row.cascade_depth, 2);
    assert_eq!(row.event_type, "stage_entered");
}

#[tokio::test]
async fn stage_change_is_audited_with_old_and_new_stage() {
    let h = Harness::new();
    let id = h.project_at("Audit", 5).await;
    h.move_to(id, 6).await;

    let entry = h
        .store
        .audit_logs()
        .into_iter()
        .rfind(|a| a.action_type == action_types::STAGE_CHANGED)
        .unwrap();
    assert_eq!(entry.entity_id, Some(id));
    assert_eq!(entry.old_values.as_ref().unwrap()["stage_number"], 5);
    assert_eq!(entry.new_values.as_ref().unwrap()["stage_number"], 6);
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn payment_accumulates_and_emits_event() {
    let h = Harness::new();
    let id = h.project_with_budget("Paid work", None, 10_000).await;

    h.stages.record_payment(id, 4_000, Some(OWNER)).await.unwrap();
    let payment = h.stages.record_payment(id, 6_000, Some(OWNER)).await.unwrap();

    assert_eq!(payment.previous_paid_cents, 4_000);
    assert_eq!(payment.paid_cents, 10_000);
    assert_eq!(h.store.project(id).unwrap().paid_cents, 10_000);

    let row = h.store.events().pop().unwrap();
    let change: Change = serde_json::from_value(row.payload).unwrap();
    assert_eq!(
        change,
        Change::PaymentRecorded {
            previous_paid_cents: 4_000,
            paid_cents: 10_000,
            budget_cents: Some(10_000),
        }
    );
}

#[tokio::test]
async fn non_positive_payment_is_rejected() {
    let h = Harness::new();
    let id = h.project_with_budget("Paid work", None, 10_000).await;
    let err = h.stages.record_payment(id, 0, None).await.unwrap_err();
    assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
}

#[tokio::test]
async fn payment_for_unknown_project_is_not_found() {
    let h = Harness::new();
    let err = h.stages.record_payment(77, 100, None).await.unwrap_err();
    assert_matches!(
        err,
        PipelineError::Store(StoreError::NotFound { id: 77, .. })
    );
}
