//! End-to-end upload-and-process flow.
//!
//! [`JobOrchestrator`] sequences credential issuance, the direct blob
//! transfer and status polling for one job at a time, and publishes the
//! resulting [`Job`] on a [`tokio::sync::watch`] channel. Call
//! [`JobOrchestrator::subscribe`] to observe it.
//!
//! A second [`submit`](JobOrchestrator::submit) while a flow is in flight
//! is rejected with [`JobError::Busy`]; nothing is queued.
//!
//! Lock order: poller slot, then the poller's own delivery lock, then the
//! flow state. Poll callbacks only ever take the flow state.

use std::sync::{Arc, Mutex, MutexGuard};

use jobflow_core::job::{Job, JobPhase};
use jobflow_core::types::{BackendJobState, JobId, UploadCredential};
use tokio::sync::watch;

use crate::api::{BackendApi, StatusResponse};
use crate::config::ClientConfig;
use crate::credentials::CredentialClient;
use crate::error::JobError;
use crate::poller::{
    lock, JobStatusPoller, PollOutcome, PollPolicy, PollUpdate, PollerPhase, StatusClient,
};
use crate::transfer::{BlobTransferClient, HttpBlobTransfer};

/// Message recorded when the backend fails a job without saying why.
const UNSPECIFIED_FAILURE: &str = "job failed";

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Runs one upload-and-process flow at a time.
pub struct JobOrchestrator {
    credentials: Arc<dyn CredentialClient>,
    transfer: Arc<dyn BlobTransferClient>,
    status: Arc<dyn StatusClient>,
    policy: PollPolicy,
    /// Poller of the current (or last) flow.
    poller: Mutex<Option<JobStatusPoller>>,
    flow: Arc<FlowShared>,
}

/// State shared between the orchestrator and its poll callbacks.
struct FlowShared {
    state: Mutex<FlowState>,
    job_tx: watch::Sender<Job>,
    busy_tx: watch::Sender<bool>,
}

struct FlowState {
    job: Job,
    /// The busy guard. Released on terminal outcomes, flow failures and
    /// cancellation.
    busy: bool,
    /// Identifies the current flow. Cancelling bumps it so that anything
    /// still running for the old flow stops touching the state.
    flow_id: u64,
}

impl FlowShared {
    fn lock(&self) -> MutexGuard<'_, FlowState> {
        lock(&self.state)
    }

    /// Apply `f` to the state of flow `flow_id` and publish the result.
    /// Returns `None` when that flow has been cancelled or superseded.
    fn update<R>(&self, flow_id: u64, f: impl FnOnce(&mut FlowState) -> R) -> Option<R> {
        let mut state = self.lock();
        if state.flow_id != flow_id {
            return None;
        }
        let result = f(&mut state);
        self.publish(&state);
        Some(result)
    }

    fn publish(&self, state: &FlowState) {
        self.job_tx.send_replace(state.job.clone());
        self.busy_tx.send_replace(state.busy);
    }

    /// `on_update` callback body.
    fn apply_update(&self, flow_id: u64, update: PollUpdate) {
        self.update(flow_id, |state| match update {
            PollUpdate::Status(status) => {
                state.job.record_status(status.state, status.percent, status.error);
            }
            PollUpdate::TickFailed { attempt, error } => {
                state
                    .job
                    .record_poll_failure(format!("status check {attempt} failed: {error}"));
            }
        });
    }

    /// `on_terminal` callback body.
    fn finish(&self, flow_id: u64, outcome: PollOutcome, planned_out_key: Option<String>) {
        self.update(flow_id, |state| {
            let result = match outcome {
                PollOutcome::Finished(status) => {
                    finish_with_status(&mut state.job, status, planned_out_key)
                }
                PollOutcome::GaveUp { attempts } => state
                    .job
                    .fail(format!("status polling gave up after {attempts} attempts")),
            };
            state.busy = false;

            match result {
                Ok(()) => tracing::info!(
                    flow_id,
                    job_id = ?state.job.job_id,
                    phase = %state.job.phase,
                    output_key = ?state.job.output_key,
                    last_error = ?state.job.last_error,
                    "Job finished",
                ),
                Err(e) => tracing::error!(flow_id, error = %e, "Could not record job outcome"),
            }
        });
    }
}

fn finish_with_status(
    job: &mut Job,
    status: StatusResponse,
    planned_out_key: Option<String>,
) -> Result<(), jobflow_core::error::CoreError> {
    job.record_status(status.state, status.percent, None);
    match status.state {
        BackendJobState::Completed => job.complete(status.out_key.or(planned_out_key)),
        _ => job.fail(status.error.unwrap_or_else(|| UNSPECIFIED_FAILURE.to_string())),
    }
}

impl JobOrchestrator {
    pub fn new(
        credentials: Arc<dyn CredentialClient>,
        transfer: Arc<dyn BlobTransferClient>,
        status: Arc<dyn StatusClient>,
        policy: PollPolicy,
    ) -> Self {
        let job = Job::new();
        let (job_tx, _) = watch::channel(job.clone());
        let (busy_tx, _) = watch::channel(false);

        Self {
            credentials,
            transfer,
            status,
            policy,
            poller: Mutex::new(None),
            flow: Arc::new(FlowShared {
                state: Mutex::new(FlowState {
                    job,
                    busy: false,
                    flow_id: 0,
                }),
                job_tx,
                busy_tx,
            }),
        }
    }

    /// Build an orchestrator talking HTTP to the configured backend.
    pub fn from_config(config: &ClientConfig) -> Result<Self, JobError> {
        let http = config.http_client()?;
        let api = Arc::new(BackendApi::with_client(http.clone(), config.api_url.clone()));
        let transfer = Arc::new(HttpBlobTransfer::with_client(http));
        Ok(Self::new(api.clone(), transfer, api, config.poll_policy()))
    }

    /// Observe every published change of the current job.
    pub fn subscribe(&self) -> watch::Receiver<Job> {
        self.flow.job_tx.subscribe()
    }

    /// Current job state.
    pub fn snapshot(&self) -> Job {
        self.flow.lock().job.clone()
    }

    /// Whether a flow currently holds the busy guard.
    pub fn is_busy(&self) -> bool {
        self.flow.lock().busy
    }

    /// Phase of the current flow's poller, if one was ever started.
    pub fn poller_phase(&self) -> Option<PollerPhase> {
        lock(&self.poller).as_ref().map(JobStatusPoller::phase)
    }

    /// Resolve once no flow holds the busy guard.
    pub async fn wait_until_idle(&self) {
        let mut busy = self.flow.busy_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    /// Start a new flow for `file`.
    ///
    /// Returns once polling has started; the rest of the flow runs in the
    /// background and is observable through [`subscribe`](Self::subscribe).
    /// Credential and transfer failures are recorded as `FAILED` and also
    /// returned. A flow cancelled with
    /// [`cancel_current`](Self::cancel_current) before polling started
    /// returns [`JobError::Cancelled`].
    pub async fn submit(&self, file: FileUpload, content_type: &str) -> Result<(), JobError> {
        let flow_id = self.begin_flow()?;
        tracing::info!(
            flow_id,
            filename = %file.filename,
            bytes = file.bytes.len(),
            content_type,
            "Requesting upload credential",
        );

        // 1. Credential.
        let credential = match self
            .credentials
            .request_upload_credential(&file.filename, content_type)
            .await
        {
            Ok(credential) => credential,
            Err(e) => return self.fail_flow(flow_id, e),
        };

        let attached = self.flow.update(flow_id, |state| {
            state.job.attach_credential(credential.clone())?;
            state.job.advance(JobPhase::Uploading)
        });
        match attached {
            None => {
                return Err(self.abandoned(flow_id));
            }
            Some(Err(e)) => return self.fail_flow(flow_id, e.into()),
            Some(Ok(())) => {}
        }

        // 2. Transfer.
        tracing::info!(
            flow_id,
            job_id = %credential.job_id,
            key = %credential.key,
            "Uploading to blob store",
        );
        if let Err(e) = self.transfer.upload(&credential, file.bytes, content_type).await {
            return self.fail_flow(flow_id, e);
        }

        // 3. Poll.
        self.start_polling(flow_id, credential)
    }

    /// Stop the current flow locally.
    ///
    /// Stops the poller and releases the busy guard. The job keeps the
    /// last state it was observed in and the backend is not told anything.
    /// A flow still presigning or uploading is abandoned at its next step.
    /// Returns `false` when nothing was in flight.
    pub fn cancel_current(&self) -> bool {
        let slot = lock(&self.poller);
        if let Some(poller) = slot.as_ref() {
            poller.stop();
        }

        let mut state = self.flow.lock();
        if !state.busy {
            return false;
        }
        state.busy = false;
        state.flow_id += 1;
        self.flow.publish(&state);

        tracing::info!(
            job_id = ?state.job.job_id,
            phase = %state.job.phase,
            "Cancelled current job locally",
        );
        true
    }

    /// Presigned URL for the finished job's output.
    ///
    /// Fails with [`JobError::Caller`], without touching the network,
    /// unless the job is `COMPLETED` with a known output key.
    pub async fn request_download(&self) -> Result<String, JobError> {
        let key = {
            let state = self.flow.lock();
            match (state.job.phase, &state.job.output_key) {
                (JobPhase::Completed, Some(key)) => key.clone(),
                (JobPhase::Completed, None) => {
                    return Err(JobError::Caller(
                        "job completed without an output key".into(),
                    ));
                }
                (phase, _) => {
                    return Err(JobError::Caller(format!(
                        "download requested while job is {phase}"
                    )));
                }
            }
        };

        let credential = self.credentials.request_download_credential(&key).await?;
        tracing::info!(key = %key, "Download URL issued");
        Ok(credential.url)
    }

    // ---- private helpers ----

    /// Take the busy guard and reset the job for a new flow.
    fn begin_flow(&self) -> Result<u64, JobError> {
        let mut state = self.flow.lock();
        if state.busy {
            tracing::debug!(phase = %state.job.phase, "Rejecting submit while busy");
            return Err(JobError::Busy);
        }

        let mut job = Job::new();
        job.advance(JobPhase::Presigning)?;
        state.job = job;
        state.busy = true;
        state.flow_id += 1;
        self.flow.publish(&state);
        Ok(state.flow_id)
    }

    /// Record `error` as the flow's failure and release the guard.
    fn fail_flow(&self, flow_id: u64, error: JobError) -> Result<(), JobError> {
        let recorded = self.flow.update(flow_id, |state| {
            let result = state.job.fail(error.to_string());
            state.busy = false;
            result
        });

        match recorded {
            Some(Ok(())) => {
                tracing::error!(flow_id, error = %error, "Job flow failed");
            }
            Some(Err(e)) => {
                tracing::error!(flow_id, error = %error, transition_error = %e, "Job flow failed");
            }
            None => {
                tracing::warn!(flow_id, error = %error, "Cancelled job flow failed");
            }
        }
        Err(error)
    }

    fn abandoned(&self, flow_id: u64) -> JobError {
        tracing::info!(flow_id, "Job flow was cancelled, not continuing");
        JobError::Cancelled
    }

    fn start_polling(&self, flow_id: u64, credential: UploadCredential) -> Result<(), JobError> {
        let mut slot = lock(&self.poller);

        let job_id: JobId = match self
            .flow
            .update(flow_id, |state| state.job.advance(JobPhase::Polling))
        {
            None => {
                return Err(self.abandoned(flow_id));
            }
            Some(Err(e)) => return self.fail_flow(flow_id, e.into()),
            Some(Ok(())) => credential.job_id.clone(),
        };

        let poller = JobStatusPoller::new(Arc::clone(&self.status), self.policy.clone());

        let on_update = {
            let flow = Arc::clone(&self.flow);
            move |update| flow.apply_update(flow_id, update)
        };
        let on_terminal = {
            let flow = Arc::clone(&self.flow);
            let planned_out_key = credential.out_key.clone();
            move |outcome| flow.finish(flow_id, outcome, planned_out_key)
        };

        if let Err(e) = poller.start(job_id, on_update, on_terminal) {
            return self.fail_flow(flow_id, e);
        }

        if let Some(previous) = slot.replace(poller) {
            previous.stop();
        }
        Ok(())
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        if let Some(poller) = lock(&self.poller).take() {
            poller.stop();
        }
    }
}
