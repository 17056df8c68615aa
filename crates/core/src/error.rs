//! Error taxonomy for the harvester.
//!
//! Per-symbol failures (`Transport`, `RateLimit`, `Storage`) are isolated by the
//! ingestion loop; only `Configuration` errors at start-up stop the process.

use std::time::Duration;
use thiserror::Error;

/// Errors that cross component boundaries (source, sink, configuration).
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Network or HTTP-level failure, including timeouts and undecodable bodies.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source signalled throttling.
    #[error("rate limited by source{}", retry_after_suffix(.retry_after))]
    RateLimit {
        /// Delay requested by the source, when it sent one.
        retry_after: Option<Duration>,
    },

    /// Write or read failure in the storage engine.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or missing configuration. Fatal at start-up.
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(", retry after {}s", delay.as_secs()),
        None => String::new(),
    }
}

impl HarvestError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a rate limit error.
    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimit { retry_after }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true if the identical request should be reissued after a delay.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }

    /// Returns true if the process must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns the delay requested by the source, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("decode failed: {err}"))
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvestError>;
