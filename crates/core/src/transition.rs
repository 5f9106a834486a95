//! Stage transition validation.
//!
//! Pure decision logic: given where a project is and where a caller wants it
//! to go, decide whether the move is legal and whether it needs an explicit
//! confirmation before it may be committed. Nothing here writes anything.

use serde::Serialize;

use crate::error::CoreError;
use crate::stages::{self, Stage, FINAL_STAGE, FIRST_STAGE};
use crate::types::StageNumber;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// How a requested target stage relates to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    NoOp,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::NoOp => "no_op",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that a stage number lies within the catalog.
pub fn validate_stage_number(number: StageNumber) -> Result<&'static Stage, CoreError> {
    stages::by_number(number).ok_or_else(|| {
        CoreError::Validation(format!(
            "Stage number {number} is out of range. Must be between {FIRST_STAGE} and {FINAL_STAGE}"
        ))
    })
}

/// Classify a move from `current` to `target`.
///
/// Both numbers must be in `[1, 18]`.
pub fn classify(current: StageNumber, target: StageNumber) -> Result<Direction, CoreError> {
    validate_stage_number(current)?;
    validate_stage_number(target)?;
    Ok(match target.cmp(&current) {
        std::cmp::Ordering::Greater => Direction::Forward,
        std::cmp::Ordering::Less => Direction::Backward,
        std::cmp::Ordering::Equal => Direction::NoOp,
    })
}

// ---------------------------------------------------------------------------
// TransitionPlan
// ---------------------------------------------------------------------------

/// A validated, not yet committed stage move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionPlan {
    pub from: &'static Stage,
    pub to: &'static Stage,
    pub direction: Direction,
}

impl TransitionPlan {
    /// Backward moves discard completed work and must be confirmed.
    pub fn requires_confirmation(&self) -> bool {
        self.direction == Direction::Backward
    }

    /// Whether committing this plan lands the project in the final stage.
    pub fn completes_project(&self) -> bool {
        self.to.is_final()
    }

    /// Whether committing this plan takes the project out of the final stage.
    pub fn reopens_project(&self) -> bool {
        self.from.is_final() && !self.to.is_final()
    }
}

/// Build a plan for moving from `current` to `target`.
///
/// Rejects out-of-range numbers and no-op moves with a validation error.
pub fn plan_transition(
    current: StageNumber,
    target: StageNumber,
) -> Result<TransitionPlan, CoreError> {
    let direction = classify(current, target)?;
    if direction == Direction::NoOp {
        return Err(CoreError::Validation(
            "Project is already at this stage".to_string(),
        ));
    }
    Ok(TransitionPlan {
        from: validate_stage_number(current)?,
        to: validate_stage_number(target)?,
        direction,
    })
}

/// Check that a plan may be committed given the caller's confirmation.
pub fn authorize(plan: &TransitionPlan, confirmed: bool) -> Result<(), CoreError> {
    if plan.requires_confirmation() && !confirmed {
        return Err(CoreError::ConfirmationRequired {
            from: plan.from.number,
            to: plan.to.number,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
