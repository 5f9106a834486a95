//! Trigger matching shared by event-driven and sweep-driven evaluation.
//!
//! [`match_trigger`] decides whether a trigger is satisfied on a given
//! occasion and, if so, returns the de-duplication key identifying the
//! satisfaction event. A rule fires at most once per `(rule, key)` pair.
//!
//! Key formats:
//!
//! | Trigger            | Key                                   |
//! |--------------------|---------------------------------------|
//! | `stage_enter`      | `stage_enter:{history_id}`            |
//! | `stage_duration`   | `stage_duration:{last_history_id}`    |
//! | `condition_met`    | `condition_met:{last_history_id}`     |
//! | `project_created`  | `project_created:{project_id}`        |
//! | `payment_received` | `payment_received:{project_id}:{paid}`|
//! | `time_scheduled`   | `time_scheduled:{occurrence RFC3339}` |
//!
//! Keys derived from the latest history entry make level triggers fire once
//! per continuous dwell: re-entering a stage writes a new history row and so
//! a fresh key.

use serde::{Deserialize, Serialize};

use crate::automation::Trigger;
use crate::project::{crosses_full_payment, ProjectState};
use crate::types::{Cents, DbId, StageNumber, Timestamp};

/// Suffix added to claim keys of dry-run fires.
pub const DRY_RUN_KEY_SUFFIX: &str = "#dry";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A committed change to a project, as seen by the matcher.
///
/// This is also the JSON payload of an outbox row, tagged by `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    ProjectCreated {
        history_id: DbId,
    },
    StageEntered {
        history_id: DbId,
        from_stage: Option<StageNumber>,
        to_stage: StageNumber,
    },
    PaymentRecorded {
        previous_paid_cents: Cents,
        paid_cents: Cents,
        budget_cents: Option<Cents>,
    },
}

impl Change {
    /// Value of the outbox `event_type` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProjectCreated { .. } => "project_created",
            Self::StageEntered { .. } => "stage_entered",
            Self::PaymentRecorded { .. } => "payment_recorded",
        }
    }
}

/// The situation a trigger is evaluated in.
#[derive(Debug, Clone, Copy)]
pub enum Occasion<'a> {
    /// A change event for `project`; `project` is the state re-read after
    /// the change.
    Change {
        change: &'a Change,
        project: &'a ProjectState,
        now: Timestamp,
    },
    /// Periodic re-check of one project's level conditions.
    Sweep {
        project: &'a ProjectState,
        now: Timestamp,
    },
    /// Periodic project-independent tick covering `(window_start, now]`.
    Tick {
        window_start: Timestamp,
        now: Timestamp,
    },
}

impl Occasion<'_> {
    pub fn project(&self) -> Option<&ProjectState> {
        match self {
            Self::Change { project, .. } | Self::Sweep { project, .. } => Some(*project),
            Self::Tick { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A satisfied trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerMatch {
    pub dedup_key: String,
    pub project_id: Option<DbId>,
}

impl TriggerMatch {
    /// The claim key, kept apart from live fires when the rule is in dry-run.
    pub fn claim_key(&self, dry_run: bool) -> String {
        if dry_run {
            format!("{}{DRY_RUN_KEY_SUFFIX}", self.dedup_key)
        } else {
            self.dedup_key.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Level conditions that hold for `project` at `now`.
fn level_match(trigger: &Trigger, project: &ProjectState, now: Timestamp) -> Option<String> {
    match trigger {
        Trigger::StageDuration(c) => (project.stage_number == c.stage_number
            && project.days_in_stage(now) >= c.duration_days)
            .then(|| format!("stage_duration:{}", project.last_history_id)),
        Trigger::ConditionMet(c) => c
            .evaluate(project, now)
            .then(|| format!("condition_met:{}", project.last_history_id)),
        _ => None,
    }
}

/// Decide whether `trigger` is satisfied on `occasion`.
pub fn match_trigger(trigger: &Trigger, occasion: &Occasion<'_>) -> Option<TriggerMatch> {
    let key = match (trigger, occasion) {
        (Trigger::StageEnter(c), Occasion::Change { change, .. }) => match change {
            Change::StageEntered {
                history_id,
                to_stage,
                ..
            } if *to_stage == c.stage_number => Some(format!("stage_enter:{history_id}")),
            _ => None,
        },

        (Trigger::ProjectCreated, Occasion::Change { change, project, .. }) => match change {
            Change::ProjectCreated { .. } => Some(format!("project_created:{}", project.id)),
            _ => None,
        },

        // Payments only ever increase the paid total, so the total at the
        // crossing identifies it.
        (Trigger::PaymentReceived, Occasion::Change { change, project, .. }) => match change {
            Change::PaymentRecorded {
                previous_paid_cents,
                paid_cents,
                budget_cents,
            } if crosses_full_payment(*previous_paid_cents, *paid_cents, *budget_cents) => {
                Some(format!("payment_received:{}:{paid_cents}", project.id))
            }
            _ => None,
        },

        (
            Trigger::StageDuration(_) | Trigger::ConditionMet(_),
            Occasion::Change { project, now, .. } | Occasion::Sweep { project, now },
        ) => level_match(trigger, project, *now),

        (Trigger::TimeScheduled(schedule), Occasion::Tick { window_start, now }) => schedule
            .latest_occurrence(*window_start, *now)
            .map(|at| format!("time_scheduled:{}", at.to_rfc3339())),

        _ => None,
    }?;

    Some(TriggerMatch {
        dedup_key: key,
        project_id: occasion.project().map(|p| p.id),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{parse_trigger, StageDurationConfig, StageEnterConfig};
    use crate::project::tests::sample;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn entered(history_id: DbId, to_stage: StageNumber) -> Change {
        Change::StageEntered {
            history_id,
            from_stage: Some(to_stage - 1),
            to_stage,
        }
    }

    // -- Edge triggers ------------------------------------------------------

    #[test]
    fn stage_enter_matches_configured_stage_only() {
        let t = Trigger::StageEnter(StageEnterConfig { stage_number: 6 });
        let p = sample(6);
        let hit = match_trigger(
            &t,
            &Occasion::Change {
                change: &entered(41, 6),
                project: &p,
                now: now(),
            },
        )
        .unwrap();
        assert_eq!(hit.dedup_key, "stage_enter:41");
        assert_eq!(hit.project_id, Some(1));

        let miss = match_trigger(
            &t,
            &Occasion::Change {
                change: &entered(42, 7),
                project: &p,
                now: now(),
            },
        );
        assert!(miss.is_none());
    }

    #[test]
    fn stage_enter_never_fires_on_sweep() {
        let t = Trigger::StageEnter(StageEnterConfig { stage_number: 6 });
        let p = sample(6);
        assert!(match_trigger(&t, &Occasion::Sweep { project: &p, now: now() }).is_none());
    }

    #[test]
    fn project_created_keys_by_project() {
        let p = sample(1);
        let hit = match_trigger(
            &Trigger::ProjectCreated,
            &Occasion::Change {
                change: &Change::ProjectCreated { history_id: 5 },
                project: &p,
                now: now(),
            },
        )
        .unwrap();
        assert_eq!(hit.dedup_key, "project_created:1");
    }

    #[test]
    fn payment_received_requires_crossing() {
        let p = sample(15);
        let crossing = Change::PaymentRecorded {
            previous_paid_cents: 50_000,
            paid_cents: 100_000,
            budget_cents: Some(100_000),
        };
        let partial = Change::PaymentRecorded {
            previous_paid_cents: 0,
            paid_cents: 50_000,
            budget_cents: Some(100_000),
        };
        let hit = match_trigger(
            &Trigger::PaymentReceived,
            &Occasion::Change {
                change: &crossing,
                project: &p,
                now: now(),
            },
        );
        assert_eq!(hit.unwrap().dedup_key, "payment_received:1:100000");

        let miss = match_trigger(
            &Trigger::PaymentReceived,
            &Occasion::Change {
                change: &partial,
                project: &p,
                now: now(),
            },
        );
        assert!(miss.is_none());
    }

    // -- Level triggers -----------------------------------------------------

    #[test]
    fn stage_duration_fires_after_threshold() {
        let t = Trigger::StageDuration(StageDurationConfig {
            stage_number: 5,
            duration_days: 7,
        });
        let mut p = sample(5);

        p.stage_entered_at = now() - Duration::days(8);
        let hit = match_trigger(&t, &Occasion::Sweep { project: &p, now: now() }).unwrap();
        assert_eq!(hit.dedup_key, "stage_duration:100");

        p.stage_entered_at = now() - Duration::days(6);
        assert!(match_trigger(&t, &Occasion::Sweep { project: &p, now: now() }).is_none());
    }

    #[test]
    fn stage_duration_key_changes_on_reentry() {
        let t = Trigger::StageDuration(StageDurationConfig {
            stage_number: 5,
            duration_days: 7,
        });
        let mut p = sample(5);
        p.stage_entered_at = now() - Duration::days(8);
        let first = match_trigger(&t, &Occasion::Sweep { project: &p, now: now() }).unwrap();

        p.last_history_id = 250;
        let second = match_trigger(&t, &Occasion::Sweep { project: &p, now: now() }).unwrap();
        assert_ne!(first.dedup_key, second.dedup_key);
    }

    #[test]
    fn stage_duration_ignores_other_stage() {
        let t = Trigger::StageDuration(StageDurationConfig {
            stage_number: 5,
            duration_days: 1,
        });
        let mut p = sample(6);
        p.stage_entered_at = now() - Duration::days(20);
        assert!(match_trigger(&t, &Occasion::Sweep { project: &p, now: now() }).is_none());
    }

    #[test]
    fn condition_met_evaluated_on_change_and_sweep() {
        let t = parse_trigger(
            "condition_met",
            &json!({"field": "stage_number", "operator": "gte", "value": 14}),
        )
        .unwrap();
        let p = sample(14);
        let on_change = match_trigger(
            &t,
            &Occasion::Change {
                change: &entered(100, 14),
                project: &p,
                now: now(),
            },
        )
        .unwrap();
        let on_sweep = match_trigger(&t, &Occasion::Sweep { project: &p, now: now() }).unwrap();
        assert_eq!(on_change.dedup_key, on_sweep.dedup_key);
    }

    // -- Schedule -----------------------------------------------------------

    #[test]
    fn time_scheduled_is_project_less() {
        let t = parse_trigger("time_scheduled", &json!({"schedule": "0 12 * * *"})).unwrap();
        let hit = match_trigger(
            &t,
            &Occasion::Tick {
                window_start: now() - Duration::minutes(5),
                now: now(),
            },
        )
        .unwrap();
        assert_eq!(hit.project_id, None);
        assert_eq!(hit.dedup_key, "time_scheduled:2026-03-10T12:00:00+00:00");
    }

    #[test]
    fn time_scheduled_ignores_project_occasions() {
        let t = parse_trigger("time_scheduled", &json!({"schedule": "* * * * *"})).unwrap();
        let p = sample(3);
        assert!(match_trigger(&t, &Occasion::Sweep { project: &p, now: now() }).is_none());
    }

    #[test]
    fn change_payload_is_tagged() {
        let v = serde_json::to_value(entered(7, 3)).unwrap();
        assert_eq!(v["type"], "stage_entered");
        assert_eq!(v["to_stage"], 3);
        let back: Change = serde_json::from_value(v).unwrap();
        assert_eq!(back.kind(), "stage_entered");
    }

    #[test]
    fn dry_run_claim_key_is_separate() {
        let m = TriggerMatch {
            dedup_key: "stage_enter:1".to_string(),
            project_id: Some(1),
        };
        assert_eq!(m.claim_key(false), "stage_enter:1");
        assert_eq!(m.claim_key(true), "stage_enter:1#dry");
    }
}
