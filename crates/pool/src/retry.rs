//! Retrying operations on pooled connections.

use dirpool_resilience::{Operation, OperationError, RetryError, RetryExecutor, RetryStats};
use tracing::debug;

use crate::connection::ConnectionFactory;
use crate::error::{Error, Result};
use crate::pool::{Conn, ConnectionPool};
use crate::pooled::PooledConnection;

/// Check out a connection, run `operation` under `executor`, and check the
/// connection back in.
///
/// Before each retry the pooled connection is reopened in place. If the
/// final failure carries a retryable result code the connection is closed
/// instead of being pooled again. A failed reopen surfaces the pool's own
/// open error.
pub async fn retryable_execute<P, O>(
    pool: &P,
    executor: &RetryExecutor,
    operation: &O,
) -> Result<(O::Output, RetryStats)>
where
    P: ConnectionPool,
    O: Operation<Conn<P::Factory>>,
{
    let mut conn = pool.get_connection().await?;
    let outcome = executor.execute(&mut conn, &OnPooled(operation)).await;
    match outcome {
        Ok(done) => {
            pool.checkin(conn).await;
            Ok(done)
        }
        Err(err) => {
            if executor.policy().is_retryable(err.result_code()) {
                conn.invalidate();
            }
            debug!(pool = pool.name(), code = %err.result_code(), "retried operation failed");
            pool.checkin(conn).await;
            Err(surface(err))
        }
    }
}

fn surface(err: RetryError) -> Error {
    match err {
        RetryError::Reconnect {
            source,
            last,
            stats,
        } => match source.downcast::<Error>() {
            Ok(pool_error) => *pool_error,
            Err(source) => Error::Retry(RetryError::Reconnect {
                source,
                last,
                stats,
            }),
        },
        other => Error::Retry(other),
    }
}

struct OnPooled<'a, O>(&'a O);

impl<F, O> Operation<PooledConnection<F>> for OnPooled<'_, O>
where
    F: ConnectionFactory,
    O: Operation<F::Connection>,
{
    type Output = O::Output;

    async fn execute(
        &self,
        conn: &mut PooledConnection<F>,
    ) -> std::result::Result<O::Output, OperationError> {
        self.0.execute(&mut **conn).await
    }
}
