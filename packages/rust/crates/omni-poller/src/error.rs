//! Error types for update fetching and polling.

use thiserror::Error;

/// A failed `getUpdates`-style fetch.
///
/// Pollers treat every variant as transient.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport failure (connect, timeout, body read).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote API answered with an error envelope or status.
    #[error("API error (code={code}): {description}")]
    Api {
        /// API `error_code` or HTTP status.
        code: i64,
        /// Human-readable description from the API.
        description: String,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other source-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Reasons a poller stops before its stop signal fires.
#[derive(Error, Debug)]
pub enum PollError {
    /// The receiving half of the destination channel was dropped.
    #[error("destination channel closed")]
    DestinationClosed,

    /// The retry policy gave up after consecutive fetch failures.
    #[error("fetch failed {attempts} consecutive times: {last_error}")]
    RetryLimitExceeded {
        /// Number of consecutive failed fetches.
        attempts: u32,
        /// Rendered error of the final attempt.
        last_error: String,
    },

    /// A spawned inner poller task panicked or was cancelled.
    #[error("inner poller task failed: {0}")]
    InnerTask(String),
}

/// Result type for polling operations.
pub type Result<T> = std::result::Result<T, PollError>;
