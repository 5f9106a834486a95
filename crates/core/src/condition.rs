//! Predicates for `condition_met` triggers.
//!
//! A condition compares one numeric project field against a constant.
//! Money fields compare in minor units. A field that has no value for the
//! project (e.g. `budget` when no budget is set) never satisfies a condition.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::project::ProjectState;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    StageNumber,
    Budget,
    PaidAmount,
    OutstandingAmount,
    PaidPercent,
    DaysInStage,
}

impl ConditionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageNumber => "stage_number",
            Self::Budget => "budget",
            Self::PaidAmount => "paid_amount",
            Self::OutstandingAmount => "outstanding_amount",
            Self::PaidPercent => "paid_percent",
            Self::DaysInStage => "days_in_stage",
        }
    }

    /// Current value of this field for `project`, if it has one.
    pub fn read(&self, project: &ProjectState, now: Timestamp) -> Option<f64> {
        match self {
            Self::StageNumber => Some(f64::from(project.stage_number)),
            Self::Budget => project.budget_cents.map(|b| b as f64),
            Self::PaidAmount => Some(project.paid_cents as f64),
            Self::OutstandingAmount => project.outstanding_cents().map(|c| c as f64),
            Self::PaidPercent => project.paid_percent(),
            Self::DaysInStage => Some(project.days_in_stage(now) as f64),
        }
    }
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }

    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Lt => left < right,
            Self::Lte => left <= right,
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// `field operator value`, e.g. `days_in_stage gte 10`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: ConditionField,
    pub operator: Operator,
    pub value: f64,
}

impl Condition {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.value.is_finite() {
            return Err(CoreError::Validation(
                "Condition value must be a finite number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn evaluate(&self, project: &ProjectState, now: Timestamp) -> bool {
        self.field
            .read(project, now)
            .is_some_and(|left| self.operator.apply(left, self.value))
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.field.as_str(),
            self.operator.as_str(),
            self.value
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
