//! Direct transfer of file bytes to the blob store.
//!
//! The bytes go straight to the presigned URL; the backend never sees
//! them. One PUT, one outcome -- no chunking and no retry.

use async_trait::async_trait;
use chrono::Utc;
use jobflow_core::types::UploadCredential;
use reqwest::header::CONTENT_TYPE;

use crate::error::JobError;

/// Performs the upload described by a presigned credential.
#[async_trait]
pub trait BlobTransferClient: Send + Sync {
    /// PUT `bytes` to the credential's URL with the given content type.
    async fn upload(
        &self,
        credential: &UploadCredential,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), JobError>;
}

/// [`BlobTransferClient`] backed by a plain HTTP PUT.
pub struct HttpBlobTransfer {
    client: reqwest::Client,
}

impl HttpBlobTransfer {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Reuse an existing [`reqwest::Client`] (shares its connection pool
    /// and timeout with the backend client).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpBlobTransfer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobTransferClient for HttpBlobTransfer {
    async fn upload(
        &self,
        credential: &UploadCredential,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), JobError> {
        let size = bytes.len();
        let response = self
            .client
            .put(&credential.url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(key = %credential.key, bytes = size, "Blob transfer complete");
            return Ok(());
        }

        Err(classify_failure(credential, status.as_u16()))
    }
}

/// A rejected PUT after the credential's window closed is a credential
/// problem, not a transport one.
fn classify_failure(credential: &UploadCredential, status: u16) -> JobError {
    if credential.is_expired(Utc::now()) {
        JobError::CredentialExpired { status }
    } else {
        JobError::Transfer { status }
    }
}
