//! Pool with a hard ceiling on open connections.

use std::sync::Arc;

use super::{Core, PoolConfig, PoolKind, impl_connection_pool};
use crate::connection::ConnectionFactory;
use crate::error::Result;
use crate::strategy::Connector;

/// Connection pool that never holds more than `max_size` connections.
///
/// When every connection is checked out, [`get_connection`] waits for one
/// to be returned, up to `block_wait_time` (or until the pool is closed when
/// no limit is set) and then fails with
/// [`Error::BlockingTimeout`](crate::Error::BlockingTimeout).
///
/// [`get_connection`]: crate::ConnectionPool::get_connection
pub struct BlockingPool<F: ConnectionFactory> {
    core: Arc<Core<F>>,
}

impl<F: ConnectionFactory> BlockingPool<F> {
    /// Create an uninitialized pool.
    ///
    /// # Errors
    /// Returns error if `config` is invalid.
    pub fn new(name: impl Into<String>, connector: Connector<F>, config: PoolConfig) -> Result<Self> {
        let core = Core::new(name.into(), PoolKind::Blocking, connector, config)?;
        Ok(Self {
            core: Arc::new(core),
        })
    }
}

impl_connection_pool!(BlockingPool);
