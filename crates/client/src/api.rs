//! REST client for the backend that issues credentials and reports job
//! status.
//!
//! Wraps the three backend endpoints the job flow needs
//! (`POST /presign/upload`, `GET /status`, `GET /presign/download`) plus
//! the direct issues CSV export, using [`reqwest`].

use chrono::Utc;
use jobflow_core::export::IssuesExportRequest;
use jobflow_core::types::{BackendJobState, DownloadCredential, JobId, UploadCredential};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// HTTP client for the job backend.
pub struct BackendApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of `POST /presign/upload`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignUploadRequest<'a> {
    filename: &'a str,
    content_type: &'a str,
}

/// Response of `POST /presign/upload`.
///
/// Some backend builds name the URL field `uploadUrl`; both spellings
/// are accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignUploadResponse {
    #[serde(alias = "uploadUrl")]
    pub url: String,
    pub key: String,
    pub bucket: String,
    pub expires_in: u64,
    pub job_id: String,
    #[serde(default)]
    pub status_key: Option<String>,
    #[serde(default)]
    pub out_key: Option<String>,
}

/// Response of `GET /status?jobId=...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: JobId,
    pub state: BackendJobState,
    /// Advisory progress (0-100).
    #[serde(default)]
    pub percent: Option<u32>,
    /// Key of the processed artifact, once there is one.
    #[serde(default)]
    pub out_key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error body shape the backend uses on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl PresignUploadResponse {
    /// Validate the response and turn it into a credential stamped with
    /// the time it was received.
    fn into_credential(self, status: u16) -> Result<UploadCredential, JobError> {
        for (field, value) in [("url", &self.url), ("key", &self.key), ("jobId", &self.job_id)] {
            if value.trim().is_empty() {
                return Err(malformed(status, format!("presign response has an empty `{field}`")));
            }
        }

        Ok(UploadCredential {
            url: self.url,
            key: self.key,
            bucket: self.bucket,
            expires_in_secs: self.expires_in,
            job_id: JobId::new(self.job_id),
            status_key: self.status_key,
            out_key: self.out_key,
            issued_at: Utc::now(),
        })
    }
}

impl BackendApi {
    /// Create a new API client for the backend at `api_url`.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `https://xxx.execute-api.region.amazonaws.com`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Ask the backend for a presigned PUT URL for `filename`.
    ///
    /// Sends `POST /presign/upload`. The backend creates the job at the
    /// same time and returns its id alongside the credential.
    pub async fn presign_upload(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadCredential, JobError> {
        let response = self
            .client
            .post(format!("{}/presign/upload", self.api_url))
            .json(&PresignUploadRequest {
                filename,
                content_type,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        let presign: PresignUploadResponse = Self::parse_response(response).await?;
        presign.into_credential(status)
    }

    /// Fetch the current status of `job_id`.
    ///
    /// Sends `GET /status?jobId=...`. A response describing a different
    /// job is treated as a protocol violation.
    pub async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse, JobError> {
        let response = self
            .client
            .get(format!("{}/status", self.api_url))
            .query(&[("jobId", job_id.as_str())])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body: StatusResponse = Self::parse_response(response).await?;
        if body.job_id != *job_id {
            return Err(malformed(
                status,
                format!("status response is for job {}, expected {job_id}", body.job_id),
            ));
        }
        Ok(body)
    }

    /// Ask the backend for a presigned GET URL for `key`.
    ///
    /// Sends `GET /presign/download?key=...`.
    pub async fn presign_download(&self, key: &str) -> Result<DownloadCredential, JobError> {
        let response = self
            .client
            .get(format!("{}/presign/download", self.api_url))
            .query(&[("key", key)])
            .send()
            .await?;

        let status = response.status().as_u16();
        let credential: DownloadCredential = Self::parse_response(response).await?;
        if credential.url.trim().is_empty() {
            return Err(malformed(status, "download presign response has an empty `url`".into()));
        }
        Ok(credential)
    }

    /// Download the issues CSV export described by `request`.
    ///
    /// Sends `GET /issues.csv?owner=..&repo=..&labels=..&wantedN=..` and
    /// returns the raw CSV bytes.
    pub async fn download_issues_csv(
        &self,
        request: &IssuesExportRequest,
    ) -> Result<Vec<u8>, JobError> {
        let request = request
            .clone()
            .validated()
            .map_err(|e| JobError::Caller(e.to_string()))?;

        let response = self
            .client
            .get(format!("{}/issues.csv", self.api_url))
            .query(&request)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`JobError::Backend`] carrying
    /// the status and whatever message the body offered.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, JobError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Backend {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type. A
    /// body that does not fit is a [`JobError::Backend`], not a network
    /// failure.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, JobError> {
        let response = Self::ensure_success(response).await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| malformed(status, format!("unexpected response body: {e}")))
    }
}

fn malformed(status: u16, message: String) -> JobError {
    JobError::Backend { status, message }
}

/// Pull a human-readable message out of an error body. Falls back to an
/// empty string when the body is not JSON or carries no message.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_default()
}
