//! Error taxonomy for the scrape pipeline.
//!
//! Errors are classified by where they stop the run:
//! - Entity level: `FetchError` / `ExtractError` while processing one athlete, contained as a degraded record
//! - Run level: `DiscoveryError` and `SnapshotError`, fatal for the run
//! - Startup: `ConfigError`

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Cause of the last failed fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Server answered with a non-success status code.
    Status(u16),
    /// Connection, TLS, timeout or body read failure.
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Status(code) => write!(f, "HTTP status {code}"),
            FetchFailure::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// Raised only after the retry ceiling is exhausted.
#[derive(Debug, Clone, Error)]
#[error("fetch of {url} failed after {attempts_made} attempt(s): {last}")]
pub struct FetchError {
    pub url: String,
    pub last: FetchFailure,
    pub attempts_made: u32,
}

impl FetchError {
    /// True when the last attempt got an HTTP response (site reachable, page refused).
    pub fn is_status(&self) -> bool {
        matches!(self.last, FetchFailure::Status(_))
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("document has no text content")]
    NoContent,

    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("listing fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("listing page {url} could not be parsed: {source}")]
    Extract {
        url: String,
        #[source]
        source: ExtractError,
    },
}

/// Persistence failure. Always fatal.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("SCRAPE_CONFIG_PATH points to non-existent path {0}")]
    MissingPath(PathBuf),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Terminal failure of one pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("persisting snapshot failed: {0}")]
    Persist(#[from] SnapshotError),
}
