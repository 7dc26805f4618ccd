//! Fixed-interval job status poller.
//!
//! [`JobStatusPoller`] owns the only recurring timer in the client. It
//! fetches the backend status of one job every [`PollPolicy::interval`]
//! until the backend reports a terminal state, a configured attempt cap
//! is hit, or [`JobStatusPoller::stop`] is called.
//!
//! Delivery and cancellation are serialised through one lock and an
//! epoch counter: `stop()` bumps the epoch under the lock, and the poll
//! task re-checks the epoch under the same lock before invoking any
//! callback. A response that arrives after `stop()` returned is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use jobflow_core::types::JobId;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::{BackendApi, StatusResponse};
use crate::error::JobError;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Fetches the status of a job from the backend.
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse, JobError>;
}

#[async_trait]
impl StatusClient for BackendApi {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse, JobError> {
        BackendApi::fetch_status(self, job_id).await
    }
}

/// Tunable parameters for the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Time between ticks. The first fetch happens one interval after
    /// `start`.
    pub interval: Duration,
    /// Stop after this many ticks without a terminal status. `None`
    /// polls for as long as it takes.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Non-terminal observation from one tick.
#[derive(Debug)]
pub enum PollUpdate {
    /// The backend reported a non-terminal status.
    Status(StatusResponse),
    /// The fetch failed; the tick was skipped and polling continues.
    TickFailed { attempt: u32, error: JobError },
}

/// How a poll run ended. Delivered exactly once per run.
#[derive(Debug)]
pub enum PollOutcome {
    /// The backend reported `COMPLETED` or `FAILED`.
    Finished(StatusResponse),
    /// [`PollPolicy::max_attempts`] ticks passed without a terminal status.
    GaveUp { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerPhase {
    Idle,
    Running,
    Stopped,
}

/// Polls one job's status on a fixed interval.
///
/// Dropping the poller stops it, so a poller can never outlive its
/// owner.
pub struct JobStatusPoller {
    status: Arc<dyn StatusClient>,
    policy: PollPolicy,
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<PollerInner>,
}

struct PollerInner {
    phase: PollerPhase,
    /// Bumped on every start and stop; a poll task only delivers while
    /// the epoch it was started with is still current.
    epoch: u64,
    cancel: Option<CancellationToken>,
    job_id: Option<JobId>,
    /// Ticks completed by the current run.
    attempts: u32,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PollerInner> {
        lock(&self.inner)
    }
}

/// Lock a mutex, recovering the data if a callback panicked while holding
/// it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobStatusPoller {
    pub fn new(status: Arc<dyn StatusClient>, policy: PollPolicy) -> Self {
        Self {
            status,
            policy,
            shared: Arc::new(Shared {
                inner: Mutex::new(PollerInner {
                    phase: PollerPhase::Idle,
                    epoch: 0,
                    cancel: None,
                    job_id: None,
                    attempts: 0,
                }),
            }),
        }
    }

    pub fn phase(&self) -> PollerPhase {
        self.shared.lock().phase
    }

    /// Ticks completed by the current (or last) run.
    pub fn attempts(&self) -> u32 {
        self.shared.lock().attempts
    }

    /// Begin polling `job_id`.
    ///
    /// `on_update` receives every non-terminal status and every skipped
    /// tick. `on_terminal` receives the final outcome once; the poller is
    /// `Stopped` by the time it runs. Both callbacks run while the poller
    /// holds its delivery lock, so they must not call back into this
    /// poller.
    ///
    /// Calling `start` on a running poller stops the previous run first.
    /// A stopped poller cannot be restarted.
    pub fn start<U, T>(&self, job_id: JobId, on_update: U, on_terminal: T) -> Result<(), JobError>
    where
        U: Fn(PollUpdate) + Send + 'static,
        T: FnOnce(PollOutcome) + Send + 'static,
    {
        if self.policy.interval.is_zero() {
            return Err(JobError::Caller("poll interval must be non-zero".into()));
        }
        if self.policy.max_attempts == Some(0) {
            return Err(JobError::Caller("poll attempt cap must be non-zero".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| JobError::Caller("poller must be started inside a Tokio runtime".into()))?;

        let (epoch, cancel) = {
            let mut inner = self.shared.lock();
            match inner.phase {
                PollerPhase::Stopped => {
                    return Err(JobError::Caller("poller is stopped and cannot be restarted".into()));
                }
                PollerPhase::Running => {
                    tracing::debug!(
                        job_id = ?inner.job_id,
                        "Restarting status poller, cancelling previous timer",
                    );
                    if let Some(previous) = inner.cancel.take() {
                        previous.cancel();
                    }
                }
                PollerPhase::Idle => {}
            }

            let cancel = CancellationToken::new();
            inner.epoch += 1;
            inner.phase = PollerPhase::Running;
            inner.cancel = Some(cancel.clone());
            inner.job_id = Some(job_id.clone());
            inner.attempts = 0;
            (inner.epoch, cancel)
        };

        tracing::info!(
            job_id = %job_id,
            interval_ms = self.policy.interval.as_millis() as u64,
            max_attempts = ?self.policy.max_attempts,
            "Status poller started",
        );

        let run = PollRun {
            status: Arc::clone(&self.status),
            shared: Arc::clone(&self.shared),
            policy: self.policy.clone(),
            job_id,
            epoch,
            cancel,
        };
        runtime.spawn(run.run(on_update, on_terminal));
        Ok(())
    }

    /// Cancel the timer. Any fetch in flight is abandoned and its result
    /// is never delivered. A no-op unless the poller is running.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        if inner.phase != PollerPhase::Running {
            return;
        }
        inner.phase = PollerPhase::Stopped;
        inner.epoch += 1;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        tracing::info!(job_id = ?inner.job_id, attempts = inner.attempts, "Status poller stopped");
    }
}

impl Drop for JobStatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Poll task
// ---------------------------------------------------------------------------

/// Everything one spawned poll task needs.
struct PollRun {
    status: Arc<dyn StatusClient>,
    shared: Arc<Shared>,
    policy: PollPolicy,
    job_id: JobId,
    epoch: u64,
    cancel: CancellationToken,
}

enum Next {
    Continue,
    Done,
}

impl PollRun {
    async fn run<U, T>(self, on_update: U, on_terminal: T)
    where
        U: Fn(PollUpdate) + Send + 'static,
        T: FnOnce(PollOutcome) + Send + 'static,
    {
        let mut on_terminal = Some(on_terminal);
        let mut ticker = tokio::time::interval(self.policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;

        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            attempt += 1;
            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!(job_id = %self.job_id, attempt, "Discarding in-flight status fetch");
                    return;
                }
                result = self.status.fetch_status(&self.job_id) => result,
            };

            match self.deliver(attempt, result, &on_update, &mut on_terminal) {
                Next::Continue => {}
                Next::Done => return,
            }
        }
    }

    /// Hand one tick's result to the callbacks, unless the run has been
    /// stopped or superseded in the meantime.
    fn deliver<U, T>(
        &self,
        attempt: u32,
        result: Result<StatusResponse, JobError>,
        on_update: &U,
        on_terminal: &mut Option<T>,
    ) -> Next
    where
        U: Fn(PollUpdate),
        T: FnOnce(PollOutcome),
    {
        let mut inner = self.shared.lock();
        if inner.epoch != self.epoch {
            tracing::debug!(job_id = %self.job_id, attempt, "Dropping late status response");
            return Next::Done;
        }
        inner.attempts = attempt;

        let outcome = match result {
            Ok(status) if status.state.is_terminal() => {
                tracing::info!(
                    job_id = %self.job_id,
                    attempt,
                    state = %status.state,
                    "Job reached terminal state",
                );
                Some(PollOutcome::Finished(status))
            }
            Ok(status) => {
                tracing::debug!(
                    job_id = %self.job_id,
                    attempt,
                    state = %status.state,
                    percent = ?status.percent,
                    "Job status",
                );
                on_update(PollUpdate::Status(status));
                None
            }
            Err(error) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    attempt,
                    error = %error,
                    "Status fetch failed, skipping tick",
                );
                on_update(PollUpdate::TickFailed { attempt, error });
                None
            }
        };

        let outcome = match (outcome, self.policy.max_attempts) {
            (Some(outcome), _) => outcome,
            (None, Some(max)) if attempt >= max => {
                tracing::warn!(job_id = %self.job_id, attempts = attempt, "Status polling gave up");
                PollOutcome::GaveUp { attempts: attempt }
            }
            (None, _) => return Next::Continue,
        };

        inner.phase = PollerPhase::Stopped;
        inner.epoch += 1;
        inner.cancel = None;
        if let Some(on_terminal) = on_terminal.take() {
            on_terminal(outcome);
        }
        Next::Done
    }
}
