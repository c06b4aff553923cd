//! Shared fixtures for pool integration tests.
#![allow(dead_code)]

use std::time::Duration;

use dirpool_pool::testing::MockFactory;
use dirpool_pool::{ConnectionConfig, ConnectionStrategy, Connector, Endpoint, PoolConfig};

pub fn endpoints(hosts: &[&str]) -> Vec<Endpoint> {
    hosts
        .iter()
        .map(|host| Endpoint::parse(&format!("ldap://{host}")).unwrap())
        .collect()
}

pub fn connector(factory: &MockFactory, hosts: &[&str]) -> Connector<MockFactory> {
    connector_with(factory, hosts, ConnectionStrategy::ActivePassive)
}

pub fn connector_with(
    factory: &MockFactory,
    hosts: &[&str],
    strategy: ConnectionStrategy,
) -> Connector<MockFactory> {
    let config = ConnectionConfig::new(endpoints(hosts)).with_strategy(strategy);
    Connector::new(factory.clone(), config)
}

/// Sizing only; background maintenance off.
pub fn config(min_size: usize, max_size: usize) -> PoolConfig {
    PoolConfig {
        min_size,
        max_size,
        prune_period: Duration::ZERO,
        ..PoolConfig::default()
    }
}

/// Let spawned release tasks run.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
