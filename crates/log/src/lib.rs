//! # dirpool-log
//!
//! Structured logging setup for dirpool binaries, built on `tracing`.
//!
//! ```no_run
//! let _guard = dirpool_log::init_with(dirpool_log::Config::from_env())
//!     .expect("logger");
//! dirpool_log::info!(pool = "users", "ready");
//! ```

pub mod builder;
pub mod config;
pub mod error;
mod macros;

pub use builder::{LoggerBuilder, LoggerGuard, ReloadHandle};
pub use config::{Config, DisplayConfig, Fields, Format};
pub use error::{LogError, LogResult};

pub use tracing::{
    Instrument, Level, debug, debug_span, error, error_span, info, info_span, instrument, trace,
    trace_span, warn, warn_span,
};

/// Install the logger configured from the environment.
///
/// # Errors
/// See [`LoggerBuilder::build`].
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::from_env())
}

/// Install the logger with an explicit configuration.
///
/// # Errors
/// See [`LoggerBuilder::build`].
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
