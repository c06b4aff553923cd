//! Named pool registry

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pool::ConnectionPool;

/// Concurrent map of pools by name.
///
/// Lets an application configure several directories once and look the
/// pools up by name afterwards.
pub struct PoolRegistry<P: ConnectionPool> {
    pools: DashMap<String, Arc<P>>,
}

impl<P: ConnectionPool> PoolRegistry<P> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// Register `pool` under its own name.
    ///
    /// # Errors
    /// Returns [`Error::DuplicatePool`] if the name is taken.
    pub fn register(&self, pool: P) -> Result<Arc<P>> {
        let name = pool.name().to_string();
        match self.pools.entry(name) {
            Entry::Occupied(occupied) => Err(Error::DuplicatePool {
                name: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => {
                let pool = Arc::new(pool);
                vacant.insert(Arc::clone(&pool));
                Ok(pool)
            }
        }
    }

    /// Look a pool up by name
    pub fn get(&self, name: &str) -> Option<Arc<P>> {
        self.pools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a pool without closing it
    pub fn remove(&self, name: &str) -> Option<Arc<P>> {
        self.pools.remove(name).map(|(_, pool)| pool)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered pools
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool is registered
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Initialize every registered pool, stopping at the first failure.
    pub async fn initialize_all(&self) -> Result<()> {
        for pool in self.snapshot() {
            if let Err(err) = pool.initialize().await {
                warn!(pool = pool.name(), error = %err, "pool failed to initialize");
                return Err(err);
            }
        }
        info!(pools = self.len(), "all pools initialized");
        Ok(())
    }

    /// Close every pool and empty the registry.
    pub async fn close(&self) {
        let pools = self.snapshot();
        self.pools.clear();
        for pool in pools {
            pool.close().await;
        }
    }

    /// Clone out the pools so no shard lock is held across an await
    fn snapshot(&self) -> Vec<Arc<P>> {
        let mut pools: Vec<_> = self.pools.iter().map(|entry| Arc::clone(entry.value())).collect();
        pools.sort_by(|a, b| a.name().cmp(b.name()));
        pools
    }
}

impl<P: ConnectionPool> Default for PoolRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ConnectionPool> std::fmt::Debug for PoolRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.names())
            .finish()
    }
}
