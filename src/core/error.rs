use thiserror::Error;

/// Failures reported to callers of the run service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("{0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn agent_not_found(id: i64) -> Self {
        ServiceError::NotFound(format!("Agent with ID {} not found", id))
    }

    pub fn run_not_found(id: i64) -> Self {
        ServiceError::NotFound(format!("Agent run with ID {} not found", id))
    }
}

/// Rejects blank values for required text fields.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
