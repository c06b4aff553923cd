//! Error types for connection pooling
use std::time::Duration;

use dirpool_resilience::{BoxError, ResultCode, RetryError};
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by pools, connectors and validators.
///
/// Validation failures are healed inside the pool and only reach the caller
/// as [`Error::Validation`] when a checkout-time replacement is also invalid.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool or connection configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong
        message: String,
    },

    /// A frozen configuration was mutated after pool initialization
    #[error("Configuration '{target}' is immutable once the pool is initialized")]
    ImmutableConfig {
        /// Which configuration was targeted
        target: &'static str,
    },

    /// The pool has not been initialized yet
    #[error("Pool '{pool}' is not initialized")]
    NotInitialized {
        /// The pool name
        pool: String,
    },

    /// `initialize()` was called on a pool that is already initialized
    #[error("Pool '{pool}' is already initialized")]
    AlreadyInitialized {
        /// The pool name
        pool: String,
    },

    /// The pool has been shut down
    #[error("Pool '{pool}' is closed")]
    Closed {
        /// The pool name
        pool: String,
    },

    /// No connection became available within the configured block wait time
    #[error("Pool '{pool}' exhausted: no connection available after {waited:?} ({max_size} in use)")]
    BlockingTimeout {
        /// The pool name
        pool: String,
        /// How long the caller waited
        waited: Duration,
        /// Configured maximum pool size
        max_size: usize,
    },

    /// A connection could not be opened
    #[error("Failed to open connection to {endpoint}: {source}")]
    Connect {
        /// The endpoint that was tried last
        endpoint: String,
        /// The factory error
        #[source]
        source: BoxError,
    },

    /// The connector has no endpoints to try
    #[error("No endpoints configured")]
    NoEndpoints,

    /// Checkout could not produce a connection that passes validation
    #[error("Pool '{pool}' could not produce a valid connection")]
    Validation {
        /// The pool name
        pool: String,
    },

    /// A pool with this name is already registered
    #[error("Pool '{name}' is already registered")]
    DuplicatePool {
        /// The pool name
        name: String,
    },

    /// No validator constructor is registered under this key
    #[error("Unknown validator '{kind}'")]
    UnknownValidator {
        /// The configuration key
        kind: String,
    },

    /// A retried operation did not succeed
    #[error(transparent)]
    Retry(#[from] RetryError),
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connect error for `endpoint`
    pub fn connect<E>(endpoint: impl ToString, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Connect {
            endpoint: endpoint.to_string(),
            source: source.into(),
        }
    }

    /// Whether the caller hit the blocking pool's wait limit
    #[must_use]
    pub const fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::BlockingTimeout { .. })
    }

    /// Whether the error stems from configuration misuse
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::ImmutableConfig { .. }
                | Self::UnknownValidator { .. }
                | Self::DuplicatePool { .. }
        )
    }

    /// Whether the directory server could not be reached
    #[must_use]
    pub const fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::NoEndpoints)
    }

    /// Directory result code that best classifies this error
    #[must_use]
    pub const fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::Retry(err) => Some(err.result_code()),
            Self::Connect { .. } | Self::NoEndpoints => Some(ResultCode::ConnectError),
            Self::BlockingTimeout { .. } => Some(ResultCode::LdapTimeout),
            _ => None,
        }
    }

    /// The pool name associated with this error (if any)
    #[must_use]
    pub fn pool(&self) -> Option<&str> {
        match self {
            Self::NotInitialized { pool }
            | Self::AlreadyInitialized { pool }
            | Self::Closed { pool }
            | Self::BlockingTimeout { pool, .. }
            | Self::Validation { pool } => Some(pool),
            Self::DuplicatePool { name } => Some(name),
            _ => None,
        }
    }
}
