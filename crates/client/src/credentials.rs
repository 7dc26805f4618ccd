//! Upload and download credential issuance.

use async_trait::async_trait;
use jobflow_core::types::{DownloadCredential, UploadCredential};

use crate::api::BackendApi;
use crate::error::JobError;

/// Requests presigned credentials from the backend.
///
/// Stateless request/response: one round-trip per call and no retries.
/// Non-success responses surface as [`JobError::Backend`].
#[async_trait]
pub trait CredentialClient: Send + Sync {
    /// Obtain a write credential for a new job.
    async fn request_upload_credential(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadCredential, JobError>;

    /// Obtain a read credential for a finished job's output.
    ///
    /// Only meaningful once the job is `COMPLETED`; the orchestrator
    /// enforces that before calling.
    async fn request_download_credential(
        &self,
        object_key: &str,
    ) -> Result<DownloadCredential, JobError>;
}

#[async_trait]
impl CredentialClient for BackendApi {
    async fn request_upload_credential(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadCredential, JobError> {
        let credential = self.presign_upload(filename, content_type).await?;
        tracing::debug!(
            job_id = %credential.job_id,
            key = %credential.key,
            bucket = %credential.bucket,
            expires_in_secs = credential.expires_in_secs,
            "Upload credential issued",
        );
        Ok(credential)
    }

    async fn request_download_credential(
        &self,
        object_key: &str,
    ) -> Result<DownloadCredential, JobError> {
        let credential = self.presign_download(object_key).await?;
        tracing::debug!(key = %object_key, "Download credential issued");
        Ok(credential)
    }
}
