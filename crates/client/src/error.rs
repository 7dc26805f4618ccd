//! Error taxonomy for the job client.

use jobflow_core::error::CoreError;

/// Errors surfaced by every layer of the job client.
///
/// All of these end the current flow; the only thing that is tolerated
/// and retried is a single failed status tick inside the poller.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A backend call returned a non-2xx status, or a 2xx with a body
    /// that does not match the expected contract.
    #[error("Backend error ({status}): {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Backend-supplied message, empty when the body had none.
        message: String,
    },

    /// The blob store rejected the PUT.
    #[error("Blob transfer failed with HTTP {status}")]
    Transfer { status: u16 },

    /// The blob store rejected the PUT after the credential's validity
    /// window had already closed.
    #[error("Upload credential expired (blob store returned HTTP {status})")]
    CredentialExpired { status: u16 },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// A flow is already in flight on this orchestrator.
    #[error("A job is already in progress")]
    Busy,

    /// The flow was cancelled locally before polling started.
    #[error("Job was cancelled before processing started")]
    Cancelled,

    /// An operation was called outside its precondition.
    #[error("Invalid call: {0}")]
    Caller(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<reqwest::Error> for JobError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl JobError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. }
            | Self::Transfer { status }
            | Self::CredentialExpired { status } => Some(*status),
            _ => None,
        }
    }
}
