//! Issues CSV export request.
//!
//! The backend can also render a repository's issues straight to CSV
//! (`GET /issues.csv`). This is a plain download with no job behind it;
//! the request is validated here before it goes out.

use serde::Serialize;
use validator::{Validate, ValidationError};

use crate::error::CoreError;

/// Largest number of issues a single export may ask for.
pub const MAX_WANTED_ISSUES: u32 = 1000;

/// Query for `GET /issues.csv`.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct IssuesExportRequest {
    #[validate(
        length(min = 1, message = "owner must not be empty"),
        custom(function = "validate_name_segment")
    )]
    pub owner: String,
    #[validate(
        length(min = 1, message = "repo must not be empty"),
        custom(function = "validate_name_segment")
    )]
    pub repo: String,
    /// Comma-separated label filter; empty means no filter.
    pub labels: String,
    #[serde(rename = "wantedN")]
    #[validate(range(min = 1, max = 1000, message = "wantedN must be between 1 and 1000"))]
    pub wanted_n: u32,
}

impl IssuesExportRequest {
    /// Check the request, mapping validator failures to [`CoreError`].
    pub fn validated(self) -> Result<Self, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        Ok(self)
    }

    /// File name the export is saved under. A single path segment once
    /// the request has passed [`validated`](Self::validated).
    pub fn file_name(&self) -> String {
        format!("{}-{}-issues.csv", self.owner, self.repo)
    }
}

/// Owner and repo end up in the export's file name, so they must stay a
/// single path segment.
fn validate_name_segment(value: &str) -> Result<(), ValidationError> {
    if value.contains(['/', '\\']) || value.contains("..") {
        let mut error = ValidationError::new("path_segment");
        error.message = Some("must not contain '/', '\\' or '..'".into());
        return Err(error);
    }
    Ok(())
}
