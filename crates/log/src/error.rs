//! Logger errors

use thiserror::Error;

/// Result type for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while building or reconfiguring the logger
#[derive(Debug, Error)]
pub enum LogError {
    /// The filter directive string could not be parsed
    #[error("Invalid filter directive: {0}")]
    Filter(String),

    /// A configuration value is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A global subscriber is already installed
    #[error("Logger initialization failed: {0}")]
    Init(String),
}
