//! Client-side job lifecycle.
//!
//! A [`Job`] lives only in memory, from the moment the user picks a file
//! until it is superseded by the next one. Its [`JobPhase`] only ever
//! moves forward:
//!
//! ```text
//! IDLE -> PRESIGNING -> UPLOADING -> POLLING -> COMPLETED
//!              |            |           |
//!              +------------+-----------+----> FAILED
//! ```

use std::fmt;

use chrono::Utc;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::{BackendJobState, JobId, Timestamp, UploadCredential};

/// Upper bound for the advisory progress value.
pub const MAX_PROGRESS_PERCENT: u8 = 100;

// ---------------------------------------------------------------------------
// JobPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Idle,
    Presigning,
    Uploading,
    Polling,
    Completed,
    Failed,
}

impl JobPhase {
    /// Phases during which a flow is in flight.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Presigning | Self::Uploading | Self::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward step.
    pub fn can_advance_to(self, next: JobPhase) -> bool {
        use JobPhase::*;
        matches!(
            (self, next),
            (Idle, Presigning)
                | (Presigning, Uploading)
                | (Uploading, Polling)
                | (Polling, Completed)
                | (Presigning | Uploading | Polling, Failed)
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Presigning => "PRESIGNING",
            Self::Uploading => "UPLOADING",
            Self::Polling => "POLLING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Observable snapshot of the unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    /// Assigned by the backend together with the upload credential.
    pub job_id: Option<JobId>,
    pub phase: JobPhase,
    /// Set once; see [`Job::attach_credential`].
    pub upload_credential: Option<UploadCredential>,
    /// Only known once the job is `COMPLETED`.
    pub output_key: Option<String>,
    /// Only present in `FAILED`.
    pub last_error: Option<String>,
    /// Advisory, may go backwards between polls.
    pub progress_percent: Option<u8>,
    /// Last state the backend reported while polling.
    pub backend_state: Option<BackendJobState>,
    /// Error text the backend attached to a non-terminal status.
    pub backend_message: Option<String>,
    /// Why the most recent status check was skipped; cleared by the next
    /// successful one.
    pub poll_error: Option<String>,
    pub updated_at: Timestamp,
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

impl Job {
    pub fn new() -> Self {
        Self {
            job_id: None,
            phase: JobPhase::Idle,
            upload_credential: None,
            output_key: None,
            last_error: None,
            progress_percent: None,
            backend_state: None,
            backend_message: None,
            poll_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Move forward to `next`, rejecting any backwards or skipping step.
    pub fn advance(&mut self, next: JobPhase) -> Result<(), CoreError> {
        if !self.phase.can_advance_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.touch();
        Ok(())
    }

    /// Record the credential issued for this job. A job owns exactly one
    /// credential; a second attach is rejected.
    pub fn attach_credential(&mut self, credential: UploadCredential) -> Result<(), CoreError> {
        if self.upload_credential.is_some() {
            return Err(CoreError::Conflict(
                "upload credential is already set for this job".into(),
            ));
        }
        self.job_id = Some(credential.job_id.clone());
        self.upload_credential = Some(credential);
        self.touch();
        Ok(())
    }

    /// Republish what the backend reported on a non-terminal poll. The
    /// phase is left alone.
    pub fn record_status(
        &mut self,
        state: BackendJobState,
        percent: Option<u32>,
        message: Option<String>,
    ) {
        self.backend_state = Some(state);
        self.progress_percent = percent.map(clamp_percent);
        self.backend_message = message;
        self.poll_error = None;
        self.touch();
    }

    /// Note a status check that failed without ending the job.
    pub fn record_poll_failure(&mut self, message: impl Into<String>) {
        self.poll_error = Some(message.into());
        self.touch();
    }

    /// Move to `COMPLETED` and remember where the output landed.
    pub fn complete(&mut self, output_key: Option<String>) -> Result<(), CoreError> {
        self.advance(JobPhase::Completed)?;
        self.backend_state = Some(BackendJobState::Completed);
        self.output_key = output_key;
        self.poll_error = None;
        Ok(())
    }

    /// Move to `FAILED` with a human-readable reason.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.advance(JobPhase::Failed)?;
        self.last_error = Some(message.into());
        self.poll_error = None;
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn clamp_percent(percent: u32) -> u8 {
    percent.min(u32::from(MAX_PROGRESS_PERCENT)) as u8
}
