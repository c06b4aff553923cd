//! Retry executor
//!
//! Runs one directory operation against a connection. A failure whose result
//! code is retryable reopens the connection, waits out the backoff delay and
//! runs the operation again, until it succeeds or the policy says stop.

use std::future::Future;
use std::time::Duration;

use smallvec::SmallVec;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, OperationError, RetryError};
use crate::policy::RetryPolicy;

/// A connection that can discard its transport and open a fresh one.
pub trait Reconnect: Send {
    /// Error reported when the new transport cannot be opened
    type Error: std::error::Error + Send + Sync + 'static;

    /// Close the current transport and open a new one in its place.
    fn reconnect(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// One directory operation, runnable any number of times.
pub trait Operation<C: ?Sized>: Send + Sync {
    /// Successful response
    type Output: Send;

    /// Run the operation once against `conn`.
    fn execute(
        &self,
        conn: &mut C,
    ) -> impl Future<Output = Result<Self::Output, OperationError>> + Send;
}

/// Where an invocation is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryState {
    /// Not started
    #[default]
    Idle,
    /// Running the operation
    Attempting,
    /// Reopening and waiting before the next attempt
    Retrying,
    /// The operation returned a response
    Success,
    /// The retry budget ran out
    Exhausted,
    /// The operation failed with a non-retryable code
    NonRetryableFailure,
    /// Reopen failed or the wait was cancelled
    Aborted,
}

impl RetryState {
    /// Whether the invocation has finished
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Exhausted | Self::NonRetryableFailure | Self::Aborted
        )
    }
}

/// Counters for a single invocation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Attempts made, including the first
    pub attempts: u32,
    /// Time spent reopening, waiting and re-running; excludes the first attempt
    pub elapsed_retry_time: Duration,
    /// Waits actually applied, after jitter
    pub delays: SmallVec<[Duration; 4]>,
    /// Final state
    pub state: RetryState,
}

impl RetryStats {
    /// Retries made after the first attempt
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Executes operations under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl RetryExecutor {
    /// Create an executor for a validated policy.
    pub fn new(policy: RetryPolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            policy,
            cancel: None,
        })
    }

    /// Abort waits between attempts when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The policy this executor applies
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` on `conn`, retrying per policy.
    ///
    /// On success returns the response together with the invocation's
    /// counters.
    pub async fn execute<C, O>(
        &self,
        conn: &mut C,
        op: &O,
    ) -> Result<(O::Output, RetryStats), RetryError>
    where
        C: Reconnect,
        O: Operation<C>,
    {
        let mut stats = RetryStats::default();
        let mut retry_started: Option<Instant> = None;
        let mut previous_delay = None;

        loop {
            stats.state = RetryState::Attempting;
            stats.attempts += 1;
            debug!(attempt = stats.attempts, "running directory operation");

            let result = op.execute(conn).await;
            if let Some(started) = retry_started {
                stats.elapsed_retry_time = started.elapsed();
            }

            let error = match result {
                Ok(value) => {
                    stats.state = RetryState::Success;
                    if stats.attempts > 1 {
                        info!(
                            attempts = stats.attempts,
                            elapsed_ms = stats.elapsed_retry_time.as_millis(),
                            "operation succeeded after retry"
                        );
                    }
                    return Ok((value, stats));
                }
                Err(error) => error,
            };

            if !self.policy.is_retryable(error.code) {
                stats.state = RetryState::NonRetryableFailure;
                debug!(code = %error.code, attempts = stats.attempts, "non-retryable failure");
                return Err(RetryError::NonRetryable {
                    source: error,
                    stats,
                });
            }

            let retries_done = stats.retries();
            if !self.policy.max_retries.allows(retries_done) {
                stats.state = RetryState::Exhausted;
                warn!(
                    code = %error.code,
                    attempts = stats.attempts,
                    limit = %self.policy.max_retries,
                    "retries exhausted"
                );
                return Err(RetryError::Exhausted { last: error, stats });
            }

            stats.state = RetryState::Retrying;
            let started = *retry_started.get_or_insert_with(Instant::now);

            if let Err(reconnect_error) = conn.reconnect().await {
                stats.elapsed_retry_time = started.elapsed();
                stats.state = RetryState::Aborted;
                warn!(error = %reconnect_error, attempts = stats.attempts, "reopen failed");
                return Err(RetryError::Reconnect {
                    source: Box::new(reconnect_error),
                    last: error,
                    stats,
                });
            }

            let delay = self
                .policy
                .jitter
                .apply(self.policy.delay(retries_done + 1), previous_delay);
            previous_delay = Some(delay);
            stats.delays.push(delay);
            debug!(
                code = %error.code,
                retry = retries_done + 1,
                delay_ms = delay.as_millis(),
                "retrying after delay"
            );

            if !self.wait(delay).await {
                stats.elapsed_retry_time = started.elapsed();
                stats.state = RetryState::Aborted;
                debug!(attempts = stats.attempts, "retry cancelled");
                return Err(RetryError::Cancelled { last: error, stats });
            }
        }
    }

    /// Sleep for `delay`; returns `false` if cancelled first.
    async fn wait(&self, delay: Duration) -> bool {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => false,
                    () = tokio::time::sleep(delay) => true,
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!RetryState::Idle.is_terminal());
        assert!(!RetryState::Retrying.is_terminal());
        assert!(RetryState::Success.is_terminal());
        assert!(RetryState::Aborted.is_terminal());
    }

    #[test]
    fn executor_rejects_invalid_policy() {
        let policy = RetryPolicy::default().with_backoff_multiplier(0.0);
        assert!(RetryExecutor::new(policy).is_err());
    }
}
