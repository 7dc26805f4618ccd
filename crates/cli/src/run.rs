//! The `translate` and `export` commands.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use jobflow_client::api::BackendApi;
use jobflow_client::{FileUpload, JobOrchestrator};
use jobflow_core::export::IssuesExportRequest;
use jobflow_core::job::{Job, JobPhase};
use tokio::sync::watch;

use crate::content_type::infer_content_type;

/// How a `translate` run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateOutcome {
    /// The job completed and its output can be fetched from `download_url`.
    Completed { download_url: String },
    /// `shutdown` fired first and the job was cancelled locally.
    Cancelled,
}

/// Upload `file`, wait for the backend to process it and return the
/// download URL of the result.
///
/// When `shutdown` resolves first the current flow is cancelled and
/// [`TranslateOutcome::Cancelled`] is returned.
pub async fn translate<S>(
    orchestrator: &JobOrchestrator,
    file: &Path,
    default_content_type: &str,
    shutdown: S,
) -> anyhow::Result<TranslateOutcome>
where
    S: Future<Output = ()>,
{
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", file.display()))?
        .to_string();
    let content_type = infer_content_type(file, default_content_type);

    let watcher = tokio::spawn(log_job_changes(orchestrator.subscribe()));
    let outcome = drive(orchestrator, FileUpload::new(filename, bytes), &content_type, shutdown).await;
    watcher.abort();
    outcome
}

async fn drive<S>(
    orchestrator: &JobOrchestrator,
    file: FileUpload,
    content_type: &str,
    shutdown: S,
) -> anyhow::Result<TranslateOutcome>
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    tokio::select! {
        result = orchestrator.submit(file, content_type) => {
            result.context("Job submission failed")?;
        }
        () = &mut shutdown => return Ok(cancel(orchestrator)),
    }

    tokio::select! {
        () = orchestrator.wait_until_idle() => {}
        () = &mut shutdown => return Ok(cancel(orchestrator)),
    }

    let job = orchestrator.snapshot();
    match job.phase {
        JobPhase::Completed => {
            let download_url = orchestrator
                .request_download()
                .await
                .context("Could not get a download URL")?;
            Ok(TranslateOutcome::Completed { download_url })
        }
        JobPhase::Failed => bail!(
            "Job failed: {}",
            job.last_error.as_deref().unwrap_or("unknown error")
        ),
        phase => bail!("Job stopped while {phase}"),
    }
}

fn cancel(orchestrator: &JobOrchestrator) -> TranslateOutcome {
    if orchestrator.cancel_current() {
        tracing::warn!("Interrupted, job cancelled locally");
    }
    TranslateOutcome::Cancelled
}

async fn log_job_changes(mut jobs: watch::Receiver<Job>) {
    while jobs.changed().await.is_ok() {
        let job = jobs.borrow_and_update().clone();
        tracing::info!(
            phase = %job.phase,
            job_id = ?job.job_id,
            backend_state = ?job.backend_state,
            progress = ?job.progress_percent,
            poll_error = ?job.poll_error,
            "Job updated",
        );
    }
}

/// Download the issues export and save it in `dir` under
/// [`IssuesExportRequest::file_name`]. Returns the written path.
pub async fn export(
    api: &BackendApi,
    request: &IssuesExportRequest,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    let bytes = api
        .download_issues_csv(request)
        .await
        .context("Issues export failed")?;

    let path = dir.join(request.file_name());
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(path = %path.display(), bytes = bytes.len(), "Issues export saved");
    Ok(path)
}
