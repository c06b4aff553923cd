//! # dirpool-pool
//!
//! Connection pooling for directory (LDAP) servers.
//!
//! - [`BlockingPool`]: hard `max_size` ceiling; checkout waits for a return
//! - [`SoftLimitPool`]: never waits; grows past `max_size` and prunes back
//! - [`Connector`]: factory plus endpoints ordered by a [`ConnectionStrategy`]
//! - [`Validator`]: compare or search health probes, run on checkout,
//!   checkin or periodically
//! - [`retryable_execute`]: runs an operation on a pooled connection under a
//!   [`RetryExecutor`](dirpool_resilience::RetryExecutor)
//!
//! Pool and connection configuration can be changed until
//! [`ConnectionPool::initialize`] runs and are immutable afterwards.

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod pool;
pub mod pooled;
pub mod registry;
pub mod retry;
mod scheduler;
pub mod settings;
pub mod strategy;
pub mod testing;
pub mod validator;

pub use connection::{CompareRequest, Connection, ConnectionFactory, DirectoryProbe, SearchRequest};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use pool::{BlockingPool, Conn, ConnectionPool, PoolConfig, PoolStats, SharedValidator, SoftLimitPool};
pub use pooled::PooledConnection;
pub use registry::PoolRegistry;
pub use retry::retryable_execute;
pub use settings::Settings;
pub use strategy::{ConnectionConfig, ConnectionStrategy, Connector};
pub use validator::{CompareValidator, SearchValidator, Validator, ValidatorRegistry, ValidatorSpec};
