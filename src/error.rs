//! Error types shared across the acquisition pipeline.

use std::time::Duration;

use thiserror::Error;

/// Failure acquiring one source's listings.
///
/// Cloneable so a single in-flight acquisition can hand the same outcome to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("Timed out after {timeout_secs}s waiting for '{selector}'")]
    ReadinessTimeout { selector: String, timeout_secs: u64 },
    #[error("Rendering failed: {0}")]
    Render(String),
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),
    #[error("Acquisition aborted: {0}")]
    Aborted(String),
}

impl AcquisitionError {
    /// Build a network error from a reqwest failure.
    pub fn network(url: &str, err: &reqwest::Error) -> Self {
        AcquisitionError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Failure resolving a source through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),
    #[error("Acquisition of {source_id} failed: {error}")]
    Acquisition {
        source_id: String,
        #[source]
        error: AcquisitionError,
    },
}

/// Invalid configuration detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid source '{source_id}': {reason}")]
    InvalidSource { source_id: String, reason: String },
    #[error("Invalid selector '{selector}' in source '{source_id}': {reason}")]
    InvalidSelector {
        source_id: String,
        selector: String,
        reason: String,
    },
    #[error("Duplicate source id: {0}")]
    DuplicateSource(String),
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(String),
}

/// Outcome of a request to the service that did not produce records.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("Too many requests, retry in {}s", retry_after.as_secs())]
    Throttled { retry_after: Duration },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
