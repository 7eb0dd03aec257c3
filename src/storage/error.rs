//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause (identifier, matcher, database,
//! pool, writer channel, etc.).

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Table identifier cannot be spliced into statement text safely.
    #[error("invalid table identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    /// Label matcher type outside EQ/NEQ/RE/NRE.
    #[error("unsupported label matcher type {0}")]
    UnsupportedMatcherKind(i32),

    /// Regex matcher value does not compile.
    #[error("invalid regex for label {label:?}: {source}")]
    InvalidRegex {
        label: String,
        #[source]
        source: regex::Error,
    },

    /// Series without a `__name__` label.
    #[error("series {index} has no metric name")]
    MissingMetricName { index: usize },

    /// Sample timestamp outside the range the `TIMESTAMP` column can hold.
    #[error("series {index} has out-of-range timestamp {timestamp_ms}ms")]
    InvalidTimestamp { index: usize, timestamp_ms: i64 },

    /// Database operation failed (duckdb error).
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Failed to acquire a pooled connection.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Counter creation or registration failed.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Writer actor queue is full.
    #[error("writer queue is full")]
    ChannelFull,

    /// Writer actor has stopped.
    #[error("writer actor is not running")]
    ChannelClosed,

    /// Statement did not finish within the configured timeout.
    #[error("statement timed out")]
    Timeout,

    /// Caller went away before the write committed; the batch was rolled back.
    #[error("write cancelled before commit")]
    Cancelled,

    /// Internal error (e.g., task join failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Whether the error was caused by the request content rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMatcherKind(_)
                | Self::InvalidRegex { .. }
                | Self::MissingMetricName { .. }
                | Self::InvalidTimestamp { .. }
        )
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChannelFull | Self::Timeout)
    }
}
