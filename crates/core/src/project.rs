//! Read-only project snapshot used by trigger matching, alerts, and analytics.
//!
//! The snapshot is re-read from the store for every evaluation; nothing here
//! is cached across ticks.

use chrono::NaiveDate;
use serde::Serialize;

use crate::stages::{self, Stage};
use crate::types::{Cents, DbId, StageNumber, Timestamp};

/// Whole seconds in a day, for elapsed-day arithmetic.
const SECS_PER_DAY: i64 = 86_400;

/// The fields of a project the engine reasons about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectState {
    pub id: DbId,
    pub title: String,
    pub client_id: Option<DbId>,
    pub client_name: Option<String>,
    pub current_stage: String,
    pub stage_number: StageNumber,
    pub budget_cents: Option<Cents>,
    pub paid_cents: Cents,
    pub assigned_to: Option<DbId>,
    pub created_by: Option<DbId>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    /// Id of the most recent stage history entry.
    pub last_history_id: DbId,
    /// When the most recent stage history entry was written.
    pub stage_entered_at: Timestamp,
    pub created_at: Timestamp,
}

impl ProjectState {
    /// Catalog entry for the current stage, `None` on corrupt data.
    pub fn stage(&self) -> Option<&'static Stage> {
        stages::by_number(self.stage_number)
    }

    pub fn is_completed(&self) -> bool {
        stages::is_completed(self.stage_number)
    }

    pub fn is_fully_paid(&self) -> bool {
        is_full_payment(self.paid_cents, self.budget_cents)
    }

    /// Remaining balance, `None` without a budget. Never negative.
    pub fn outstanding_cents(&self) -> Option<Cents> {
        self.budget_cents.map(|b| (b - self.paid_cents).max(0))
    }

    /// Share of the budget paid in percent, `None` without a positive budget.
    pub fn paid_percent(&self) -> Option<f64> {
        match self.budget_cents {
            Some(b) if b > 0 => Some(self.paid_cents as f64 / b as f64 * 100.0),
            _ => None,
        }
    }

    /// Whole days since the project entered its current stage.
    pub fn days_in_stage(&self, now: Timestamp) -> i64 {
        whole_days_between(self.stage_entered_at, now)
    }
}

// ---------------------------------------------------------------------------
// Money and time helpers
// ---------------------------------------------------------------------------

/// A project counts as fully paid when it has a positive budget and the paid
/// amount has reached it.
pub fn is_full_payment(paid_cents: Cents, budget_cents: Option<Cents>) -> bool {
    matches!(budget_cents, Some(b) if b > 0 && paid_cents >= b)
}

/// Whether a payment moved the project from not fully paid to fully paid.
pub fn crosses_full_payment(
    previous_paid_cents: Cents,
    paid_cents: Cents,
    budget_cents: Option<Cents>,
) -> bool {
    paid_cents > previous_paid_cents
        && !is_full_payment(previous_paid_cents, budget_cents)
        && is_full_payment(paid_cents, budget_cents)
}

/// Elapsed whole days from `from` to `to`, floored, zero if `to` is earlier.
pub fn whole_days_between(from: Timestamp, to: Timestamp) -> i64 {
    ((to - from).num_seconds() / SECS_PER_DAY).max(0)
}

/// Render minor units as a decimal amount, e.g. `150050` as `1500.50`.
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
