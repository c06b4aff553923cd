//! Pool core shared by the blocking and soft-limit pools.
//!
//! All bookkeeping lives behind one mutex in [`State`]. Opening, closing and
//! validating connections always happen with the lock released; a slot that
//! is being opened or checked out is counted in `pending` so size limits hold
//! while the I/O is in flight. Periodic validation borrows idle connections
//! into the active set, the same way a caller does.

mod blocking;
mod config;
mod soft_limit;

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::pooled::PooledConnection;
use crate::scheduler;
use crate::settings::Settings;
use crate::strategy::{ConnectionConfig, Connector};
use crate::validator::Validator;

pub use blocking::BlockingPool;
pub use config::PoolConfig;
pub use soft_limit::SoftLimitPool;

/// Connection type produced by a factory
pub type Conn<F> = <F as ConnectionFactory>::Connection;

/// Shared validator handle
pub type SharedValidator<F> = Arc<dyn Validator<Conn<F>>>;

/// Operations common to every pool flavour.
pub trait ConnectionPool: Send + Sync + 'static {
    /// Factory the pool opens connections with
    type Factory: ConnectionFactory;

    /// Pool name used in logs and errors
    fn name(&self) -> &str;

    /// Pool configuration; frozen after [`initialize`](Self::initialize)
    fn config(&self) -> &Settings<PoolConfig>;

    /// Transport configuration; frozen after [`initialize`](Self::initialize)
    fn connection_config(&self) -> &Settings<ConnectionConfig>;

    /// Open `min_size` connections and start background maintenance.
    ///
    /// Fails fast: if any initial connection cannot be opened, the ones
    /// already opened are closed and the pool stays uninitialized.
    fn initialize(&self) -> impl Future<Output = Result<()>> + Send;

    /// Check a connection out of the pool.
    fn get_connection(
        &self,
    ) -> impl Future<Output = Result<PooledConnection<Self::Factory>>> + Send;

    /// Return a connection. Never fails; unhealthy connections are replaced.
    fn checkin(&self, conn: PooledConnection<Self::Factory>) -> impl Future<Output = ()> + Send;

    /// Stop maintenance, wake waiters and close idle connections.
    ///
    /// Idempotent. Connections still checked out report
    /// [`PooledConnection::is_usable`] as false and are closed when returned.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Remove idle connections past `expiration_time`, never going below
    /// `min_size`. Returns the number removed.
    fn prune(&self) -> impl Future<Output = usize> + Send;

    /// Validate every idle connection, replacing the ones that fail.
    /// Returns the number removed.
    fn validate_idle(&self) -> impl Future<Output = usize> + Send;

    /// Idle connections
    fn available_count(&self) -> usize;

    /// Checked-out connections
    fn active_count(&self) -> usize;

    /// Point-in-time statistics
    fn stats(&self) -> PoolStats;
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Current idle connections
    pub available: usize,
    /// Current checked-out connections
    pub active: usize,
    /// Slots reserved for connections being opened or validated
    pub pending: usize,
    /// Total connections opened
    pub created: u64,
    /// Total connections closed or dropped
    pub destroyed: u64,
    /// Total successful checkouts
    pub checkouts: u64,
    /// Total connections handed back
    pub checkins: u64,
    /// Connections removed because validation failed
    pub validation_failures: u64,
    /// Checkouts that gave up waiting
    pub blocking_timeouts: u64,
    /// Connections removed by pruning
    pub pruned: u64,
}

impl PoolStats {
    /// Connections currently owned by the pool, in any state
    #[must_use]
    pub const fn total(&self) -> usize {
        self.available + self.active + self.pending
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolKind {
    Blocking,
    SoftLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Initializing,
    Ready,
    Closed,
}

/// A pooled connection with its timestamps.
pub(crate) struct Entry<C> {
    pub(crate) id: u64,
    pub(crate) conn: C,
    pub(crate) created_at: Instant,
    pub(crate) last_activity: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    created: u64,
    destroyed: u64,
    checkouts: u64,
    checkins: u64,
    validation_failures: u64,
    blocking_timeouts: u64,
    pruned: u64,
}

struct State<C> {
    lifecycle: Lifecycle,
    idle: VecDeque<Entry<C>>,
    active: HashSet<u64>,
    pending: usize,
    counters: Counters,
}

impl<C> State<C> {
    fn total(&self) -> usize {
        self.idle.len() + self.active.len() + self.pending
    }
}

pub(crate) struct Core<F: ConnectionFactory> {
    name: String,
    kind: PoolKind,
    connector: Connector<F>,
    config: Settings<PoolConfig>,
    validator: Settings<Option<SharedValidator<F>>>,
    state: Mutex<State<Conn<F>>>,
    available: Notify,
    shutdown: CancellationToken,
    next_id: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<F: ConnectionFactory> Core<F> {
    pub(crate) fn new(
        name: String,
        kind: PoolKind,
        connector: Connector<F>,
        config: PoolConfig,
    ) -> Result<Self> {
        config.validate()?;
        let capacity = config.max_size;
        Ok(Self {
            name,
            kind,
            connector,
            config: Settings::new("pool", config),
            validator: Settings::new("validator", None),
            state: Mutex::new(State {
                lifecycle: Lifecycle::New,
                idle: VecDeque::with_capacity(capacity),
                active: HashSet::with_capacity(capacity),
                pending: 0,
                counters: Counters::default(),
            }),
            available: Notify::new(),
            shutdown: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) const fn connector(&self) -> &Connector<F> {
        &self.connector
    }

    pub(crate) const fn config(&self) -> &Settings<PoolConfig> {
        &self.config
    }

    pub(crate) const fn validator(&self) -> &Settings<Option<SharedValidator<F>>> {
        &self.validator
    }

    pub(crate) const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state.lock().lifecycle == Lifecycle::Ready
    }

    pub(crate) fn available_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let c = &state.counters;
        PoolStats {
            available: state.idle.len(),
            active: state.active.len(),
            pending: state.pending,
            created: c.created,
            destroyed: c.destroyed,
            checkouts: c.checkouts,
            checkins: c.checkins,
            validation_failures: c.validation_failures,
            blocking_timeouts: c.blocking_timeouts,
            pruned: c.pruned,
        }
    }

    fn freeze(&self) {
        self.config.freeze();
        self.connector.config().freeze();
        self.validator.freeze();
    }

    fn thaw(&self) {
        self.config.thaw();
        self.connector.config().thaw();
        self.validator.thaw();
    }

    fn closed_error(&self) -> Error {
        Error::Closed {
            pool: self.name.clone(),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    pub(crate) async fn initialize(self: &Arc<Self>) -> Result<()> {
        self.config.read().validate()?;
        self.connector.config().read().validate()?;
        {
            let mut state = self.state.lock();
            match state.lifecycle {
                Lifecycle::New => state.lifecycle = Lifecycle::Initializing,
                Lifecycle::Initializing | Lifecycle::Ready => {
                    return Err(Error::AlreadyInitialized {
                        pool: self.name.clone(),
                    });
                }
                Lifecycle::Closed => return Err(self.closed_error()),
            }
        }
        self.freeze();

        let min_size = self.config.read().min_size;
        let mut opened = Vec::with_capacity(min_size);
        for _ in 0..min_size {
            match self.open().await {
                Ok(entry) => opened.push(entry),
                Err(err) => {
                    error!(pool = %self.name, opened = opened.len(), min_size, error = %err, "pool initialization failed");
                    let count = opened.len() as u64;
                    close_all(opened).await;
                    {
                        let mut state = self.state.lock();
                        state.counters.destroyed += count;
                        if state.lifecycle == Lifecycle::Initializing {
                            state.lifecycle = Lifecycle::New;
                        }
                    }
                    self.thaw();
                    return Err(err);
                }
            }
        }

        let rejected = {
            let mut state = self.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                state.counters.destroyed += opened.len() as u64;
                Some(opened)
            } else {
                state.idle.extend(opened);
                state.lifecycle = Lifecycle::Ready;
                None
            }
        };
        if let Some(opened) = rejected {
            close_all(opened).await;
            return Err(self.closed_error());
        }

        self.available.notify_waiters();
        let handles = scheduler::spawn(self);
        self.tasks.lock().extend(handles);
        info!(pool = %self.name, kind = ?self.kind, min_size, "pool initialized");
        Ok(())
    }

    pub(crate) async fn close(&self) {
        let (idle, tasks) = {
            let mut state = self.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                return;
            }
            state.lifecycle = Lifecycle::Closed;
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.counters.destroyed += idle.len() as u64;
            state.active.clear();
            (idle, std::mem::take(&mut *self.tasks.lock()))
        };
        self.shutdown.cancel();
        self.available.notify_waiters();

        let closed = idle.len();
        close_all(idle).await;
        for outcome in join_all(tasks).await {
            if let Err(err) = outcome {
                warn!(pool = %self.name, error = %err, "maintenance task ended abnormally");
            }
        }
        info!(pool = %self.name, closed, "pool closed");
    }

    // -- checkout -----------------------------------------------------------

    pub(crate) async fn checkout(self: &Arc<Self>) -> Result<PooledConnection<F>> {
        let (block_wait, max_size, probe) = {
            let config = self.config.read();
            (config.block_wait_time, config.max_size, config.validate_on_checkout)
        };
        let started = Instant::now();
        let deadline = block_wait.map(|wait| started + wait);

        let reserved = loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                match state.lifecycle {
                    Lifecycle::New | Lifecycle::Initializing => {
                        return Err(Error::NotInitialized {
                            pool: self.name.clone(),
                        });
                    }
                    Lifecycle::Closed => return Err(self.closed_error()),
                    Lifecycle::Ready => {}
                }
                if let Some(entry) = state.idle.pop_front() {
                    state.pending += 1;
                    break Some(entry);
                }
                if self.kind == PoolKind::SoftLimit || state.total() < max_size {
                    state.pending += 1;
                    break None;
                }
            }

            debug!(pool = %self.name, max_size, "pool exhausted, waiting for a connection");
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Err(self.closed_error()),
                () = &mut notified => {}
                () = sleep_until(deadline) => {
                    self.state.lock().counters.blocking_timeouts += 1;
                    warn!(pool = %self.name, max_size, "timed out waiting for a connection");
                    return Err(Error::BlockingTimeout {
                        pool: self.name.clone(),
                        waited: started.elapsed(),
                        max_size,
                    });
                }
            }
        };

        let mut entry = match reserved {
            Some(entry) => entry,
            None => self.open_reserved().await?,
        };

        if !self.is_valid(&mut entry.conn, probe).await {
            debug!(pool = %self.name, id = entry.id, "connection failed checkout validation, replacing");
            self.discard(entry, true).await;
            entry = self.open_reserved().await?;
            if !self.is_valid(&mut entry.conn, probe).await {
                warn!(pool = %self.name, id = entry.id, "replacement connection failed validation");
                self.discard(entry, true).await;
                self.release_reservation();
                return Err(Error::Validation {
                    pool: self.name.clone(),
                });
            }
        }

        self.admit(entry).await
    }

    /// Move a reserved entry into the active set.
    async fn admit(self: &Arc<Self>, mut entry: Entry<Conn<F>>) -> Result<PooledConnection<F>> {
        let accepted = {
            let mut state = self.state.lock();
            state.pending -= 1;
            if state.lifecycle == Lifecycle::Ready {
                state.active.insert(entry.id);
                state.counters.checkouts += 1;
                true
            } else {
                state.counters.destroyed += 1;
                false
            }
        };
        if accepted {
            entry.last_activity = Instant::now();
            Ok(PooledConnection::new(entry, Arc::clone(self)))
        } else {
            entry.conn.close().await;
            Err(self.closed_error())
        }
    }

    /// Open into a slot already counted in `pending`; frees it on failure.
    async fn open_reserved(&self) -> Result<Entry<Conn<F>>> {
        match self.open().await {
            Ok(entry) => Ok(entry),
            Err(err) => {
                self.release_reservation();
                Err(err)
            }
        }
    }

    fn release_reservation(&self) {
        self.state.lock().pending -= 1;
        self.available.notify_one();
    }

    /// Close a reserved entry without freeing its slot.
    async fn discard(&self, mut entry: Entry<Conn<F>>, failed_validation: bool) {
        {
            let mut state = self.state.lock();
            state.counters.destroyed += 1;
            if failed_validation {
                state.counters.validation_failures += 1;
            }
        }
        entry.conn.close().await;
    }

    async fn open(&self) -> Result<Entry<Conn<F>>> {
        let conn = self.connector.connect().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.lock().counters.created += 1;
        let now = Instant::now();
        Ok(Entry {
            id,
            conn,
            created_at: now,
            last_activity: now,
        })
    }

    /// Open a replacement for an in-place reconnect.
    pub(crate) async fn reopen(&self) -> Result<Conn<F>> {
        let conn = self.connector.connect().await?;
        let mut state = self.state.lock();
        state.counters.created += 1;
        state.counters.destroyed += 1;
        Ok(conn)
    }

    /// Local liveness check plus the validator when `probe` is set.
    async fn is_valid(&self, conn: &mut Conn<F>, probe: bool) -> bool {
        if !conn.is_usable() {
            return false;
        }
        if !probe {
            return true;
        }
        let validator = self.validator.get();
        match validator {
            Some(validator) => validator.validate(conn).await,
            None => true,
        }
    }

    // -- checkin ------------------------------------------------------------

    pub(crate) async fn release(
        &self,
        mut entry: Entry<Conn<F>>,
        discard: bool,
        transport_closed: bool,
    ) {
        let probe = self.config.read().validate_on_checkin;
        let failed_validation =
            !discard && self.is_ready() && !self.is_valid(&mut entry.conn, probe).await;

        let (rejected, ready) = {
            let mut state = self.state.lock();
            state.counters.checkins += 1;
            let ready = state.lifecycle == Lifecycle::Ready;
            let tracked = state.active.remove(&entry.id);
            if ready && tracked && !discard && !failed_validation {
                entry.last_activity = Instant::now();
                state.idle.push_back(entry);
                (None, ready)
            } else {
                state.counters.destroyed += 1;
                if failed_validation {
                    state.counters.validation_failures += 1;
                }
                (Some(entry), ready)
            }
        };
        self.available.notify_one();

        if let Some(mut entry) = rejected {
            debug!(pool = %self.name, id = entry.id, discard, failed_validation, "closing returned connection");
            if !transport_closed {
                entry.conn.close().await;
            }
            if ready {
                self.ensure_min_size().await;
            }
        }
    }

    /// Bookkeeping for a connection dropped outside a runtime.
    pub(crate) fn forget(&self, id: u64) {
        {
            let mut state = self.state.lock();
            state.active.remove(&id);
            state.counters.checkins += 1;
            state.counters.destroyed += 1;
        }
        self.available.notify_one();
    }

    // -- maintenance --------------------------------------------------------

    /// Open connections until the pool holds at least `min_size`.
    pub(crate) async fn ensure_min_size(&self) {
        let min_size = self.config.read().min_size;
        loop {
            {
                let mut state = self.state.lock();
                if state.lifecycle != Lifecycle::Ready || state.total() >= min_size {
                    return;
                }
                state.pending += 1;
            }
            match self.open_reserved().await {
                Ok(entry) => {
                    if let Some(mut entry) = self.put_idle(entry) {
                        entry.conn.close().await;
                        return;
                    }
                }
                Err(err) => {
                    warn!(pool = %self.name, min_size, error = %err, "failed to restore minimum pool size");
                    return;
                }
            }
        }
    }

    /// Return a reserved entry to the idle queue; hands it back when closed.
    fn put_idle(&self, entry: Entry<Conn<F>>) -> Option<Entry<Conn<F>>> {
        let rejected = {
            let mut state = self.state.lock();
            state.pending -= 1;
            if state.lifecycle == Lifecycle::Ready {
                state.idle.push_back(entry);
                None
            } else {
                state.counters.destroyed += 1;
                Some(entry)
            }
        };
        self.available.notify_one();
        rejected
    }

    /// Hand an entry borrowed by validation back from the active set.
    /// Returns it when it failed or the pool closed meanwhile.
    fn return_borrowed(
        &self,
        mut entry: Entry<Conn<F>>,
        healthy: bool,
    ) -> Option<Entry<Conn<F>>> {
        let rejected = {
            let mut state = self.state.lock();
            let tracked = state.active.remove(&entry.id);
            if healthy && tracked && state.lifecycle == Lifecycle::Ready {
                entry.last_activity = Instant::now();
                state.idle.push_back(entry);
                None
            } else {
                state.counters.destroyed += 1;
                if !healthy {
                    state.counters.validation_failures += 1;
                }
                Some(entry)
            }
        };
        self.available.notify_one();
        rejected
    }

    pub(crate) async fn prune(&self) -> usize {
        let (enabled, expiration, min_size) = {
            let config = self.config.read();
            (config.prunes(), config.expiration_time, config.min_size)
        };
        if !enabled {
            return 0;
        }

        let now = Instant::now();
        let evicted = {
            let mut state = self.state.lock();
            if state.lifecycle != Lifecycle::Ready {
                return 0;
            }
            let surplus = state.total().saturating_sub(min_size);
            if surplus == 0 {
                return 0;
            }
            let mut entries: Vec<_> = state.idle.drain(..).collect();
            entries.sort_by_key(|entry| entry.last_activity);

            let mut evicted = Vec::new();
            for entry in entries {
                let idle_for = now.saturating_duration_since(entry.last_activity);
                if evicted.len() < surplus && idle_for > expiration {
                    evicted.push(entry);
                } else {
                    state.idle.push_back(entry);
                }
            }
            state.counters.pruned += evicted.len() as u64;
            state.counters.destroyed += evicted.len() as u64;
            evicted
        };

        let pruned = evicted.len();
        if pruned > 0 {
            close_all(evicted).await;
            info!(pool = %self.name, pruned, "pruned idle connections");
        }
        pruned
    }

    pub(crate) async fn validate_idle(&self) -> usize {
        if !self.config.read().validate_periodically {
            return 0;
        }
        let ids: Vec<u64> = {
            let state = self.state.lock();
            if state.lifecycle != Lifecycle::Ready {
                return 0;
            }
            state.idle.iter().map(|entry| entry.id).collect()
        };

        let mut removed = 0;
        for id in ids {
            let borrowed = {
                let mut state = self.state.lock();
                if state.lifecycle != Lifecycle::Ready {
                    break;
                }
                let position = state.idle.iter().position(|entry| entry.id == id);
                let entry = position.and_then(|index| state.idle.remove(index));
                if entry.is_some() {
                    state.active.insert(id);
                }
                entry
            };
            // Checked out since the snapshot
            let Some(mut entry) = borrowed else { continue };

            let healthy = self.is_valid(&mut entry.conn, true).await;
            if let Some(mut entry) = self.return_borrowed(entry, healthy) {
                entry.conn.close().await;
                if !healthy {
                    debug!(pool = %self.name, id, "idle connection failed validation");
                    removed += 1;
                }
                if !self.is_ready() {
                    break;
                }
            }
        }

        if removed > 0 {
            info!(pool = %self.name, removed, "replaced invalid idle connections");
            self.ensure_min_size().await;
        }
        removed
    }
}

impl<F: ConnectionFactory> Drop for Core<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn close_all<C: Connection>(entries: impl IntoIterator<Item = Entry<C>>) {
    join_all(entries.into_iter().map(|mut entry| async move {
        entry.conn.close().await;
    }))
    .await;
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Delegates [`ConnectionPool`] to the wrapped [`Core`].
macro_rules! impl_connection_pool {
    ($pool:ident) => {
        impl<F: $crate::connection::ConnectionFactory> $crate::pool::ConnectionPool for $pool<F> {
            type Factory = F;

            fn name(&self) -> &str {
                self.core.name()
            }

            fn config(&self) -> &$crate::settings::Settings<$crate::pool::PoolConfig> {
                self.core.config()
            }

            fn connection_config(
                &self,
            ) -> &$crate::settings::Settings<$crate::strategy::ConnectionConfig> {
                self.core.connector().config()
            }

            async fn initialize(&self) -> $crate::error::Result<()> {
                self.core.initialize().await
            }

            async fn get_connection(
                &self,
            ) -> $crate::error::Result<$crate::pooled::PooledConnection<F>> {
                self.core.checkout().await
            }

            async fn checkin(&self, conn: $crate::pooled::PooledConnection<F>) {
                conn.release().await;
            }

            async fn close(&self) {
                self.core.close().await;
            }

            async fn prune(&self) -> usize {
                self.core.prune().await
            }

            async fn validate_idle(&self) -> usize {
                self.core.validate_idle().await
            }

            fn available_count(&self) -> usize {
                self.core.available_count()
            }

            fn active_count(&self) -> usize {
                self.core.active_count()
            }

            fn stats(&self) -> $crate::pool::PoolStats {
                self.core.stats()
            }
        }

        impl<F: $crate::connection::ConnectionFactory> $pool<F> {
            /// Install the validator used by checkout, checkin and periodic
            /// validation. Rejected once the pool is initialized.
            pub fn set_validator(
                &self,
                validator: $crate::pool::SharedValidator<F>,
            ) -> $crate::error::Result<()> {
                self.core.validator().update(|slot| *slot = Some(validator))
            }

            /// The connector this pool opens connections through
            pub fn connector(&self) -> &$crate::strategy::Connector<F> {
                self.core.connector()
            }
        }

        impl<F: $crate::connection::ConnectionFactory> Clone for $pool<F> {
            fn clone(&self) -> Self {
                Self {
                    core: std::sync::Arc::clone(&self.core),
                }
            }
        }

        impl<F: $crate::connection::ConnectionFactory> std::fmt::Debug for $pool<F> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($pool))
                    .field("name", &self.core.name())
                    .field("stats", &self.core.stats())
                    .finish()
            }
        }
    };
}

pub(crate) use impl_connection_pool;
