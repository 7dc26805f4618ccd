use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = DateTime<Utc>;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Opaque job identifier assigned by the backend when it issues the
/// upload credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Backend job state
// ---------------------------------------------------------------------------

/// Job state as reported by the backend status resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendJobState {
    Started,
    Running,
    Completed,
    Failed,
}

impl BackendJobState {
    /// `COMPLETED` and `FAILED` are final; nothing follows them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for BackendJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Started => "STARTED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Time-limited write credential for a single object in the blob store.
///
/// Issued once per job and never reused; the job that owns it keeps it
/// immutable after it is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadCredential {
    /// Presigned PUT URL.
    pub url: String,
    /// Object key the upload will land at.
    pub key: String,
    /// Bucket that owns `key`.
    pub bucket: String,
    /// Validity window of `url`, in seconds from `issued_at`.
    pub expires_in_secs: u64,
    /// Job the backend created alongside this credential.
    pub job_id: JobId,
    /// Object key of the backend's status document, when advertised.
    pub status_key: Option<String>,
    /// Object key the output is expected at, when advertised up front.
    pub out_key: Option<String>,
    /// When the client received the credential.
    pub issued_at: Timestamp,
}

impl UploadCredential {
    /// Instant after which the presigned URL is no longer honoured.
    pub fn expires_at(&self) -> Timestamp {
        let secs = i64::try_from(self.expires_in_secs).unwrap_or(i64::MAX);
        self.issued_at
            .checked_add_signed(chrono::Duration::seconds(secs))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at()
    }
}

/// Time-limited read credential for a processed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadCredential {
    pub url: String,
}
