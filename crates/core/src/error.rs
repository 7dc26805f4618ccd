use crate::job::JobPhase;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobPhase, to: JobPhase },

    #[error("Conflict: {0}")]
    Conflict(String),
}
