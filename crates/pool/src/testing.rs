//! In-memory directory double for tests and simulations.
//!
//! [`MockFactory`] opens [`MockConnection`]s without any network. Every
//! knob lives in shared state, so a test can take a host down, poison the
//! connections already handed out, or script operation failures while a
//! pool is running.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dirpool_resilience::{Operation, OperationError, ResultCode};
use parking_lot::Mutex;

use crate::connection::{
    CompareRequest, Connection, ConnectionFactory, DirectoryProbe, SearchRequest,
};
use crate::endpoint::Endpoint;

/// Errors reported by [`MockFactory`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockError {
    /// The host was marked down
    #[error("connection refused by {host}")]
    Refused {
        /// Host that refused
        host: String,
    },
    /// The open budget set with [`MockFactory::fail_opens_after`] ran out
    #[error("open budget exhausted")]
    BudgetExhausted,
}

#[derive(Default)]
struct MockState {
    down: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
    next_id: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    unhealthy: AtomicBool,
    poisoned_below: AtomicU64,
    open_budget: Mutex<Option<usize>>,
    open_delay: Mutex<Option<Duration>>,
    probe_delay: Mutex<Option<Duration>>,
    scripted: Mutex<VecDeque<ResultCode>>,
    failure_rate: Mutex<Option<(f64, ResultCode)>>,
}

/// Factory for in-memory connections.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    /// A factory where every host is up and healthy
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `host` down (refuses opens) or back up
    pub fn set_down(&self, host: &str, down: bool) {
        let mut hosts = self.state.down.lock();
        if down {
            hosts.insert(host.to_string());
        } else {
            hosts.remove(host);
        }
    }

    /// Every host an open was attempted against, in order
    pub fn attempts(&self) -> Vec<String> {
        self.state.attempts.lock().clone()
    }

    /// Connections opened successfully
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Connections closed
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Opened and not yet closed
    pub fn live(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    /// Make every probe fail (`false`) or succeed again (`true`)
    pub fn set_healthy(&self, healthy: bool) {
        self.state.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// Make probes fail on every connection opened so far
    pub fn poison_existing(&self) {
        let next = self.state.next_id.load(Ordering::SeqCst);
        self.state.poisoned_below.store(next, Ordering::SeqCst);
    }

    /// Allow `count` more successful opens, then refuse; `None` lifts the cap
    pub fn fail_opens_after(&self, count: Option<usize>) {
        *self.state.open_budget.lock() = count;
    }

    /// Delay every open
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        *self.state.open_delay.lock() = delay;
    }

    /// Delay every probe
    pub fn set_probe_delay(&self, delay: Option<Duration>) {
        *self.state.probe_delay.lock() = delay;
    }

    /// Queue result codes returned by the next [`MockConnection::run`] calls
    pub fn script_failures(&self, codes: impl IntoIterator<Item = ResultCode>) {
        self.state.scripted.lock().extend(codes);
    }

    /// Fail `rate` (0.0..=1.0) of unscripted operations with `code`
    pub fn set_failure_rate(&self, rate: f64, code: ResultCode) {
        *self.state.failure_rate.lock() = (rate > 0.0).then_some((rate.min(1.0), code));
    }
}

impl std::fmt::Debug for MockFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFactory")
            .field("opened", &self.opened())
            .field("closed", &self.closed())
            .finish_non_exhaustive()
    }
}

impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;
    type Error = MockError;

    async fn create(&self, endpoint: &Endpoint) -> Result<MockConnection, MockError> {
        let host = endpoint.host().to_string();
        self.state.attempts.lock().push(host.clone());

        let delay = *self.state.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.down.lock().contains(&host) {
            return Err(MockError::Refused { host });
        }
        {
            let mut budget = self.state.open_budget.lock();
            match budget.as_mut() {
                Some(0) => return Err(MockError::BudgetExhausted),
                Some(remaining) => *remaining -= 1,
                None => {}
            }
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            id,
            host,
            closed: false,
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection produced by [`MockFactory`].
pub struct MockConnection {
    id: u64,
    host: String,
    closed: bool,
    state: Arc<MockState>,
}

impl MockConnection {
    /// Factory-wide connection number
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Host this connection was opened against
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether [`Connection::close`] has run
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run a simulated operation, honouring scripted failures.
    pub fn run(&mut self) -> Result<String, OperationError> {
        if self.closed {
            return Err(OperationError::new(ResultCode::ServerDown, "connection closed"));
        }
        let scripted = self.state.scripted.lock().pop_front();
        if let Some(code) = scripted {
            return Err(OperationError::new(code, format!("scripted failure on {}", self.host)));
        }
        let rate = *self.state.failure_rate.lock();
        if let Some((rate, code)) = rate
            && fastrand::f64() < rate
        {
            return Err(OperationError::new(code, format!("simulated failure on {}", self.host)));
        }
        Ok(format!("{}#{}", self.host, self.id))
    }

    fn probe(&self) -> Result<(), OperationError> {
        let poisoned = self.id < self.state.poisoned_below.load(Ordering::SeqCst);
        if self.closed || poisoned || self.state.unhealthy.load(Ordering::SeqCst) {
            return Err(OperationError::new(ResultCode::ServerDown, "probe failed"));
        }
        Ok(())
    }

    async fn probe_delay(&self) {
        let delay = *self.state.probe_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Connection for MockConnection {
    fn is_usable(&self) -> bool {
        !self.closed
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl DirectoryProbe for MockConnection {
    async fn compare(&mut self, _request: &CompareRequest) -> Result<bool, OperationError> {
        self.probe_delay().await;
        self.probe().map(|()| true)
    }

    async fn search(&mut self, _request: &SearchRequest) -> Result<usize, OperationError> {
        self.probe_delay().await;
        self.probe().map(|()| 1)
    }
}

/// Operation that calls [`MockConnection::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MockOperation;

impl Operation<MockConnection> for MockOperation {
    type Output = String;

    async fn execute(&self, conn: &mut MockConnection) -> Result<String, OperationError> {
        conn.run()
    }
}
