use stageflow_core::error::CoreError;
use stageflow_core::types::DbId;

/// Failure of a persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// An optimistic write lost against a concurrent change.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Error returned by the pipeline services.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Whether the error was caused by the request itself rather than by
    /// infrastructure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Core(
                CoreError::Validation(_)
                    | CoreError::ConfirmationRequired { .. }
                    | CoreError::NotFound { .. }
                    | CoreError::Conflict(_)
            ) | Self::Store(StoreError::NotFound { .. } | StoreError::Conflict(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_is_a_rejection() {
        let err = PipelineError::from(CoreError::ConfirmationRequired { from: 10, to: 3 });
        assert!(err.is_rejection());
    }

    #[test]
    fn unavailable_store_is_not_a_rejection() {
        let err = PipelineError::from(StoreError::Unavailable("down".into()));
        assert!(!err.is_rejection());
    }

    #[test]
    fn not_found_display() {
        let err = StoreError::NotFound {
            entity: "Project",
            id: 42,
        };
        assert_eq!(err.to_string(), "Project with id 42 not found");
    }
}
