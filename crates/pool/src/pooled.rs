//! RAII handle for a checked-out connection

use std::fmt;
use std::sync::Arc;

use dirpool_resilience::Reconnect;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::pool::{Core, Entry};
use crate::settings::Settings;
use crate::strategy::ConnectionConfig;

/// A connection checked out of a pool.
///
/// Dereferences to the factory's connection type. Hand it back with
/// [`ConnectionPool::checkin`](crate::ConnectionPool::checkin) or
/// [`release`](Self::release); dropping it returns it in a background task.
pub struct PooledConnection<F: ConnectionFactory> {
    entry: Option<Entry<F::Connection>>,
    discard: bool,
    transport_closed: bool,
    core: Arc<Core<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn new(entry: Entry<F::Connection>, core: Arc<Core<F>>) -> Self {
        Self {
            entry: Some(entry),
            discard: false,
            transport_closed: false,
            core,
        }
    }

    fn entry(&self) -> &Entry<F::Connection> {
        self.entry.as_ref().expect("pooled connection used after release")
    }

    fn entry_mut(&mut self) -> &mut Entry<F::Connection> {
        self.entry.as_mut().expect("pooled connection used after release")
    }

    /// Pool-unique connection id
    pub fn id(&self) -> u64 {
        self.entry().id
    }

    /// When the underlying connection was opened
    pub fn created_at(&self) -> Instant {
        self.entry().created_at
    }

    /// Last checkout, checkin, validation or reopen
    pub fn last_activity(&self) -> Instant {
        self.entry().last_activity
    }

    /// Name of the owning pool
    pub fn pool_name(&self) -> &str {
        self.core.name()
    }

    /// Transport configuration of the owning pool
    pub fn connection_config(&self) -> &Settings<ConnectionConfig> {
        self.core.connector().config()
    }

    /// Whether the owning pool has been closed. The connection is closed
    /// as soon as it is returned.
    pub fn is_pool_closed(&self) -> bool {
        self.core.shutdown_token().is_cancelled()
    }

    /// Transport liveness, reported false once the owning pool is closed.
    pub fn is_usable(&self) -> bool {
        !self.is_pool_closed() && self.entry().conn.is_usable()
    }

    /// Close this connection on return instead of pooling it.
    pub const fn invalidate(&mut self) {
        self.discard = true;
    }

    /// Whether the connection will be closed on return
    pub const fn is_invalidated(&self) -> bool {
        self.discard
    }

    /// Return the connection to its pool.
    pub async fn release(mut self) {
        if let Some(entry) = self.entry.take() {
            self.core
                .release(entry, self.discard, self.transport_closed)
                .await;
        }
    }
}

impl<F: ConnectionFactory> std::ops::Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        &self.entry().conn
    }
}

impl<F: ConnectionFactory> std::ops::DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry_mut().conn
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let core = Arc::clone(&self.core);
                let (discard, transport_closed) = (self.discard, self.transport_closed);
                drop(handle.spawn(async move {
                    core.release(entry, discard, transport_closed).await;
                }));
            }
            Err(_) => {
                warn!(pool = %self.core.name(), id = entry.id, "connection dropped outside a runtime; not closed cleanly");
                self.core.forget(entry.id);
            }
        }
    }
}

impl<F: ConnectionFactory> Reconnect for PooledConnection<F> {
    type Error = Error;

    async fn reconnect(&mut self) -> Result<()> {
        let core = Arc::clone(&self.core);
        let entry = self.entry_mut();
        entry.conn.close().await;
        match core.reopen().await {
            Ok(conn) => {
                let now = Instant::now();
                entry.conn = conn;
                entry.created_at = now;
                entry.last_activity = now;
                debug!(pool = %core.name(), id = entry.id, "reopened pooled connection");
                self.transport_closed = false;
                Ok(())
            }
            Err(err) => {
                self.discard = true;
                self.transport_closed = true;
                Err(err)
            }
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.core.name())
            .field("id", &self.entry.as_ref().map(|entry| entry.id))
            .field("discard", &self.discard)
            .finish_non_exhaustive()
    }
}
