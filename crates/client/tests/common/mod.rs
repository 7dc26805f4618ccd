//! In-memory stand-ins for the backend and the blob store.
//!
//! Each fake counts its calls so tests can assert on the exact number of
//! network round-trips a flow would have made.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jobflow_client::api::StatusResponse;
use jobflow_client::credentials::CredentialClient;
use jobflow_client::poller::StatusClient;
use jobflow_client::transfer::BlobTransferClient;
use jobflow_client::JobError;
use jobflow_core::types::{BackendJobState, DownloadCredential, JobId, UploadCredential};

/// Interval used by timer-driven tests.
pub const INTERVAL: Duration = Duration::from_millis(1500);

pub fn credential(n: usize) -> UploadCredential {
    UploadCredential {
        url: "https://blob/x".into(),
        key: format!("k{n}"),
        bucket: "b".into(),
        expires_in_secs: 900,
        job_id: JobId::new(format!("j{n}")),
        status_key: None,
        out_key: None,
        issued_at: Utc::now(),
    }
}

pub fn running(job_id: &str, percent: u32) -> StatusResponse {
    StatusResponse {
        job_id: JobId::from(job_id),
        state: BackendJobState::Running,
        percent: Some(percent),
        out_key: None,
        error: None,
    }
}

pub fn completed(job_id: &str, out_key: Option<&str>) -> StatusResponse {
    StatusResponse {
        job_id: JobId::from(job_id),
        state: BackendJobState::Completed,
        percent: Some(100),
        out_key: out_key.map(str::to_string),
        error: None,
    }
}

pub fn failed(job_id: &str, error: Option<&str>) -> StatusResponse {
    StatusResponse {
        job_id: JobId::from(job_id),
        state: BackendJobState::Failed,
        percent: None,
        out_key: None,
        error: error.map(str::to_string),
    }
}

pub fn unavailable() -> JobError {
    JobError::Backend {
        status: 503,
        message: String::new(),
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Issues `credential(1)`, `credential(2)`, ... in call order.
#[derive(Default)]
pub struct FakeCredentials {
    pub upload_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub download_keys: Mutex<Vec<String>>,
    /// When set, every upload credential request fails with this status.
    pub fail_with: Option<u16>,
    /// When set, the first upload credential carries this planned out key.
    pub planned_out_key: Option<String>,
    /// Time each upload credential request takes.
    pub delay: Option<Duration>,
}

impl FakeCredentials {
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialClient for FakeCredentials {
    async fn request_upload_credential(
        &self,
        _filename: &str,
        _content_type: &str,
    ) -> Result<UploadCredential, JobError> {
        let n = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.fail_with {
            return Err(JobError::Backend {
                status,
                message: "presign failed".into(),
            });
        }
        let mut credential = credential(n);
        credential.out_key = self.planned_out_key.clone();
        Ok(credential)
    }

    async fn request_download_credential(
        &self,
        object_key: &str,
    ) -> Result<DownloadCredential, JobError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.download_keys
            .lock()
            .unwrap()
            .push(object_key.to_string());
        Ok(DownloadCredential {
            url: format!("https://blob/{object_key}?sig=1"),
        })
    }
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// Records the uploads it receives and answers with a fixed outcome.
#[derive(Default)]
pub struct FakeTransfer {
    pub calls: AtomicUsize,
    /// `(url, byte count, content type)` per call.
    pub uploads: Mutex<Vec<(String, usize, String)>>,
    /// When set, every upload fails with this blob-store status.
    pub fail_with: Option<u16>,
    pub delay: Option<Duration>,
}

impl FakeTransfer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobTransferClient for FakeTransfer {
    async fn upload(
        &self,
        credential: &UploadCredential,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.uploads.lock().unwrap().push((
            credential.url.clone(),
            bytes.len(),
            content_type.to_string(),
        ));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.fail_with {
            Some(status) => Err(JobError::Transfer { status }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// One scripted answer to a status fetch.
pub enum Step {
    Respond(StatusResponse),
    Fail(JobError),
    /// Answer only after the given delay.
    Slow(Duration, StatusResponse),
}

/// Replays a script of status answers. Once the script runs out the last
/// answer is repeated.
pub struct ScriptedStatus {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<StatusResponse>>,
    pub fetched: Mutex<Vec<JobId>>,
}

impl ScriptedStatus {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Number of fetches that were started.
    pub fn fetches(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl StatusClient for ScriptedStatus {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse, JobError> {
        self.fetched.lock().unwrap().push(job_id.clone());
        let step = self.steps.lock().unwrap().pop_front();
        let step = match step {
            Some(step) => step,
            None => match self.last.lock().unwrap().clone() {
                Some(status) => Step::Respond(status),
                None => Step::Fail(unavailable()),
            },
        };

        match step {
            Step::Respond(status) => {
                *self.last.lock().unwrap() = Some(status.clone());
                Ok(status)
            }
            Step::Fail(error) => Err(error),
            Step::Slow(delay, status) => {
                tokio::time::sleep(delay).await;
                *self.last.lock().unwrap() = Some(status.clone());
                Ok(status)
            }
        }
    }
}
