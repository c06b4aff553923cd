//! # dirpool-resilience
//!
//! Result-code driven retry for directory (LDAP) operations.
//!
//! - [`ResultCode`]: the protocol's result-code table
//! - [`RetryPolicy`]: retry limit, backoff, jitter and the retryable code set
//! - [`RetryExecutor`]: runs an [`Operation`], reopening the connection
//!   through [`Reconnect`] before each retry
//!
//! ```no_run
//! use std::time::Duration;
//! use dirpool_resilience::{RetryExecutor, RetryLimit, RetryPolicy};
//!
//! let policy = RetryPolicy::default()
//!     .with_max_retries(RetryLimit::Limited(3))
//!     .with_retry_wait(Duration::from_secs(1))
//!     .with_backoff_multiplier(2.0);
//! let executor = RetryExecutor::new(policy).expect("valid policy");
//! # let _ = executor;
//! ```

pub mod error;
pub mod executor;
pub mod policy;
pub mod result_code;

pub use error::{BoxError, ConfigError, OperationError, RetryError};
pub use executor::{Operation, Reconnect, RetryExecutor, RetryState, RetryStats};
pub use policy::{Backoff, JitterPolicy, RetryLimit, RetryPolicy};
pub use result_code::ResultCode;
