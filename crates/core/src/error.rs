use crate::types::{DbId, StageNumber};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A backward move was requested without the explicit confirmation step.
    #[error("Moving back from stage {from} to stage {to} requires confirmation")]
    ConfirmationRequired { from: StageNumber, to: StageNumber },

    #[error("Internal error: {0}")]
    Internal(String),
}
