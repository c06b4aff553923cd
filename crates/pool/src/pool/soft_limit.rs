//! Pool whose maximum size is a target rather than a ceiling.

use std::sync::Arc;

use super::{Core, PoolConfig, PoolKind, impl_connection_pool};
use crate::connection::ConnectionFactory;
use crate::error::Result;
use crate::strategy::Connector;

/// Connection pool that opens a new connection whenever none is idle.
///
/// Checkout never waits. Under load the pool may grow past `max_size`;
/// the surplus is pruned back towards `min_size` once it sits idle longer
/// than `expiration_time`.
pub struct SoftLimitPool<F: ConnectionFactory> {
    core: Arc<Core<F>>,
}

impl<F: ConnectionFactory> SoftLimitPool<F> {
    /// Create an uninitialized pool.
    ///
    /// # Errors
    /// Returns error if `config` is invalid.
    pub fn new(name: impl Into<String>, connector: Connector<F>, config: PoolConfig) -> Result<Self> {
        let core = Core::new(name.into(), PoolKind::SoftLimit, connector, config)?;
        Ok(Self {
            core: Arc::new(core),
        })
    }
}

impl_connection_pool!(SoftLimitPool);
