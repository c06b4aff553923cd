//! Background prune and validation tasks.
//!
//! Tasks hold a [`Weak`] reference so a dropped pool is not kept alive by
//! its own maintenance, and stop when the pool's shutdown token fires.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::ConnectionFactory;
use crate::pool::Core;

#[derive(Debug, Clone, Copy)]
enum Job {
    Prune,
    Validate,
}

/// Spawn the maintenance tasks enabled by the pool configuration.
pub(crate) fn spawn<F: ConnectionFactory>(core: &Arc<Core<F>>) -> Vec<JoinHandle<()>> {
    let config = core.config().get();
    let mut handles = Vec::with_capacity(2);
    if config.prunes() {
        handles.push(spawn_job(core, Job::Prune, config.prune_period));
    }
    if config.validate_periodically {
        handles.push(spawn_job(core, Job::Validate, config.validate_period));
    }
    handles
}

fn spawn_job<F: ConnectionFactory>(core: &Arc<Core<F>>, job: Job, period: Duration) -> JoinHandle<()> {
    let token = core.shutdown_token().child_token();
    tokio::spawn(run(Arc::downgrade(core), token, job, period))
}

async fn run<F: ConnectionFactory>(
    core: Weak<Core<F>>,
    token: CancellationToken,
    job: Job,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(core) = core.upgrade() else { break };
        match job {
            Job::Prune => {
                core.prune().await;
            }
            Job::Validate => {
                core.validate_idle().await;
            }
        }
    }
    debug!(?job, "pool maintenance task stopped");
}
