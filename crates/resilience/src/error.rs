//! Error types for directory operations and retry execution

use thiserror::Error;

use crate::executor::RetryStats;
use crate::result_code::ResultCode;

/// Boxed error used where the concrete type belongs to a collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single directory operation, classified by result code.
#[derive(Error, Debug)]
#[error("{code}: {message}")]
pub struct OperationError {
    /// Classification consulted by the retry policy
    pub code: ResultCode,
    /// Diagnostic message from the server or transport
    pub message: String,
    /// The underlying transport error, if any
    #[source]
    pub source: Option<BoxError>,
}

impl OperationError {
    /// Create an operation error without an underlying cause
    pub fn new<S: Into<String>>(code: ResultCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the transport error that caused this failure
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// The result code of this failure
    #[must_use]
    pub const fn code(&self) -> ResultCode {
        self.code
    }
}

/// Invalid retry configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range
    #[error("invalid value for '{field}': {message}")]
    Validation {
        /// The offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

impl ConfigError {
    /// Create a validation error for `field`
    pub fn validation<S: Into<String>>(field: &'static str, message: S) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Terminal outcome of a retried operation that did not succeed.
///
/// Every variant carries the [`RetryStats`] collected up to the point of
/// failure.
#[derive(Error, Debug)]
pub enum RetryError {
    /// The retry budget ran out while the server kept failing transiently
    #[error("retries exhausted: {last}")]
    Exhausted {
        /// The error returned by the final attempt
        #[source]
        last: OperationError,
        /// Counters for this invocation
        stats: RetryStats,
    },

    /// The operation failed with a code outside the retryable set
    #[error("non-retryable failure: {source}")]
    NonRetryable {
        /// The operation error, surfaced unchanged
        source: OperationError,
        /// Counters for this invocation
        stats: RetryStats,
    },

    /// Reopening the connection before a retry failed
    #[error("failed to reopen connection: {source}")]
    Reconnect {
        /// The open error reported by the connection
        source: BoxError,
        /// The operation error that triggered the reopen
        last: OperationError,
        /// Counters for this invocation
        stats: RetryStats,
    },

    /// The invocation was cancelled while waiting between attempts
    #[error("retry cancelled: {last}")]
    Cancelled {
        /// The error returned by the most recent attempt
        last: OperationError,
        /// Counters for this invocation
        stats: RetryStats,
    },
}

impl RetryError {
    /// The most recent operation error
    #[must_use]
    pub const fn last_error(&self) -> &OperationError {
        match self {
            Self::Exhausted { last, .. }
            | Self::Reconnect { last, .. }
            | Self::Cancelled { last, .. } => last,
            Self::NonRetryable { source, .. } => source,
        }
    }

    /// Result code of the most recent operation error
    #[must_use]
    pub const fn result_code(&self) -> ResultCode {
        self.last_error().code
    }

    /// Counters collected before the invocation ended
    #[must_use]
    pub const fn stats(&self) -> &RetryStats {
        match self {
            Self::Exhausted { stats, .. }
            | Self::NonRetryable { stats, .. }
            | Self::Reconnect { stats, .. }
            | Self::Cancelled { stats, .. } => stats,
        }
    }

    /// Whether the retry budget was used up
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn operation_error_display_includes_code() {
        let err = OperationError::new(ResultCode::Busy, "try later");
        assert_eq!(err.to_string(), "busy (51): try later");
        assert!(err.source().is_none());
    }

    #[test]
    fn operation_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = OperationError::new(ResultCode::ServerDown, "lost connection").with_source(io);
        assert_eq!(err.source().unwrap().to_string(), "reset by peer");
    }

    #[test]
    fn retry_error_exposes_last_code() {
        let err = RetryError::Exhausted {
            last: OperationError::new(ResultCode::Unavailable, "down"),
            stats: RetryStats::default(),
        };
        assert!(err.is_exhausted());
        assert_eq!(err.result_code(), ResultCode::Unavailable);
        assert_eq!(err.source().unwrap().to_string(), "unavailable (52): down");
    }
}
