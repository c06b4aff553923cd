//! Load simulation against an in-memory directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use dirpool_pool::testing::{MockConnection, MockFactory, MockOperation};
use dirpool_pool::{
    BlockingPool, ConnectionPool, Connector, PoolStats, SoftLimitPool, ValidatorRegistry,
    retryable_execute,
};
use dirpool_resilience::{ResultCode, RetryExecutor};
use futures::StreamExt;
use serde::Serialize;

use crate::config::{AppConfig, PoolFlavor};

/// `simulate` arguments
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Operations to run
    #[arg(short = 'n', long, default_value_t = 100)]
    pub operations: usize,

    /// Operations in flight at once
    #[arg(short = 'j', long, default_value_t = 8)]
    pub concurrency: usize,

    /// Share of operations failing with a transient error (0.0 to 1.0)
    #[arg(long, default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Host to treat as unreachable; repeatable
    #[arg(long = "down", value_name = "HOST")]
    pub down: Vec<String>,
}

/// What a simulation run produced
#[derive(Debug, Serialize)]
pub struct Summary {
    pool: String,
    operations: usize,
    succeeded: usize,
    failed: usize,
    attempts: u64,
    errors: BTreeMap<String, usize>,
    hosts: BTreeMap<String, usize>,
    stats: PoolStats,
}

impl Summary {
    /// Operations that did not succeed
    pub const fn failed(&self) -> usize {
        self.failed
    }
}

pub async fn run(config: AppConfig, args: &SimulateArgs) -> Result<Summary> {
    anyhow::ensure!(args.concurrency > 0, "concurrency must be at least 1");
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.failure_rate),
        "failure rate must be between 0 and 1"
    );

    let factory = MockFactory::new();
    for host in &args.down {
        factory.set_down(host, true);
    }
    factory.set_failure_rate(args.failure_rate, ResultCode::ServerDown);

    let executor = RetryExecutor::new(config.retry.clone()).context("invalid retry policy")?;
    let connector = Connector::new(factory.clone(), config.connection.clone());
    let validator = match &config.validator {
        Some(spec) => Some(ValidatorRegistry::<MockConnection>::with_builtins().build(spec)?),
        None => None,
    };

    match config.flavor {
        PoolFlavor::Blocking => {
            let pool = BlockingPool::new(config.name.clone(), connector, config.pool.clone())?;
            if let Some(validator) = validator {
                pool.set_validator(validator)?;
            }
            drive(pool, &executor, args).await
        }
        PoolFlavor::SoftLimit => {
            let pool = SoftLimitPool::new(config.name.clone(), connector, config.pool.clone())?;
            if let Some(validator) = validator {
                pool.set_validator(validator)?;
            }
            drive(pool, &executor, args).await
        }
    }
}

async fn drive<P>(pool: P, executor: &RetryExecutor, args: &SimulateArgs) -> Result<Summary>
where
    P: ConnectionPool<Factory = MockFactory>,
{
    pool.initialize().await?;
    let pool = Arc::new(pool);

    let outcomes: Vec<_> = futures::stream::iter(0..args.operations)
        .map(|_| {
            let pool = Arc::clone(&pool);
            async move { retryable_execute(&*pool, executor, &MockOperation).await }
        })
        .buffer_unordered(args.concurrency)
        .collect()
        .await;

    let mut summary = Summary {
        pool: pool.name().to_string(),
        operations: args.operations,
        succeeded: 0,
        failed: 0,
        attempts: 0,
        errors: BTreeMap::new(),
        hosts: BTreeMap::new(),
        stats: PoolStats::default(),
    };
    for outcome in outcomes {
        match outcome {
            Ok((served_by, stats)) => {
                summary.succeeded += 1;
                summary.attempts += u64::from(stats.attempts);
                let host = served_by.split('#').next().unwrap_or_default().to_string();
                *summary.hosts.entry(host).or_default() += 1;
            }
            Err(err) => {
                summary.failed += 1;
                if let dirpool_pool::Error::Retry(retry) = &err {
                    summary.attempts += u64::from(retry.stats().attempts);
                }
                let key = err
                    .result_code()
                    .map_or_else(|| "other".to_string(), |code| code.name().to_string());
                *summary.errors.entry(key).or_default() += 1;
                dirpool_log::debug!(error = %err, "simulated operation failed");
            }
        }
    }

    pool.close().await;
    summary.stats = pool.stats();
    Ok(summary)
}
