/// Domain error taxonomy shared by every crate in the workspace.
///
/// `NotFound` and `InvalidState` are raised synchronously when a job is
/// requested. `ResourceUnavailable` and `ExecutionFailure` normally surface
/// only inside a running job, where they are recorded on the job instead of
/// being returned to a caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] keyed by any displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
