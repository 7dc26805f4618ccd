use std::time::Duration;

use crate::error::JobError;
use crate::poller::{PollPolicy, DEFAULT_POLL_INTERVAL};

/// Content type used when none can be inferred from the file.
pub const DEFAULT_CONTENT_TYPE: &str = "text/csv";

/// Default per-request HTTP timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash.
    pub api_url: String,
    /// Interval between status polls (default: 1.5 s).
    pub poll_interval: Duration,
    /// Optional cap on status polls; `None` polls until the backend
    /// reports a terminal state.
    pub poll_max_attempts: Option<u32>,
    /// Per-request HTTP timeout (default: 30 s).
    pub request_timeout: Duration,
    /// Content type sent when the caller cannot infer one.
    pub default_content_type: String,
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has an invalid value: '{value}'")]
    Invalid { var: &'static str, value: String },
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: normalize_base_url(api_url.into()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_max_attempts: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                        | Default     |
    /// |--------------------------------|-------------|
    /// | `JOBFLOW_API_URL`              | (required)  |
    /// | `JOBFLOW_POLL_INTERVAL_MS`     | `1500`      |
    /// | `JOBFLOW_POLL_MAX_ATTEMPTS`    | unbounded   |
    /// | `JOBFLOW_REQUEST_TIMEOUT_SECS` | `30`        |
    /// | `JOBFLOW_DEFAULT_CONTENT_TYPE` | `text/csv`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("JOBFLOW_API_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("JOBFLOW_API_URL"))?;

        let mut config = Self::new(api_url);

        if let Some(ms) = parse_positive::<u64, _>(&lookup, "JOBFLOW_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }

        config.poll_max_attempts = parse_positive(&lookup, "JOBFLOW_POLL_MAX_ATTEMPTS")?;

        if let Some(secs) = parse_positive::<u64, _>(&lookup, "JOBFLOW_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(content_type) = lookup("JOBFLOW_DEFAULT_CONTENT_TYPE") {
            config.default_content_type = content_type;
        }

        Ok(config)
    }

    /// Poll policy derived from this configuration.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            max_attempts: self.poll_max_attempts,
        }
    }

    /// Shared HTTP client for the backend and the blob store.
    pub fn http_client(&self) -> Result<reqwest::Client, JobError> {
        Ok(reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Like [`parse_var`], but zero is rejected as well.
fn parse_positive<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq + ToString,
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<T, F>(lookup, var)? {
        Some(value) if value == T::default() => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
        parsed => Ok(parsed),
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
