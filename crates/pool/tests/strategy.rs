//! Endpoint ordering through a connector and a pool.

mod common;

use std::time::Duration;

use common::{config, connector_with, endpoints};
use dirpool_pool::testing::MockFactory;
use dirpool_pool::{
    ConnectionConfig, ConnectionPool, ConnectionStrategy, Connector, SoftLimitPool,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn round_robin_alternates_endpoints() {
    let factory = MockFactory::new();
    let connector = connector_with(&factory, &["a", "b"], ConnectionStrategy::RoundRobin);

    let mut hosts = Vec::new();
    for _ in 0..4 {
        hosts.push(connector.connect().await.unwrap().host().to_string());
    }
    assert_eq!(hosts, vec!["a", "b", "a", "b"]);
    assert_eq!(connector.opened(), 4);
}

#[tokio::test]
async fn round_robin_skips_a_failed_endpoint() {
    let factory = MockFactory::new();
    factory.set_down("a", true);
    let connector = connector_with(&factory, &["a", "b"], ConnectionStrategy::RoundRobin);

    assert_eq!(connector.connect().await.unwrap().host(), "b");
    assert_eq!(connector.connect().await.unwrap().host(), "b");
    assert_eq!(factory.attempts(), vec!["a", "b", "b"]);
}

#[tokio::test]
async fn active_passive_fails_over_in_order() {
    let factory = MockFactory::new();
    factory.set_down("a", true);
    let connector = connector_with(&factory, &["a", "b", "c"], ConnectionStrategy::ActivePassive);

    assert_eq!(connector.connect().await.unwrap().host(), "b");
    assert_eq!(connector.connect().await.unwrap().host(), "b");
    assert_eq!(factory.attempts(), vec!["a", "b", "a", "b"]);

    factory.set_down("a", false);
    assert_eq!(connector.connect().await.unwrap().host(), "a");
}

#[tokio::test]
async fn single_does_not_fail_over() {
    let factory = MockFactory::new();
    factory.set_down("a", true);
    let connector = connector_with(&factory, &["a", "b"], ConnectionStrategy::Single);

    let err = connector.connect().await.unwrap_err();
    assert!(err.is_connect());
    assert!(err.to_string().contains("ldap://a"));
    assert_eq!(factory.attempts(), vec!["a"]);
}

#[tokio::test]
async fn every_endpoint_down_reports_the_last_failure() {
    let factory = MockFactory::new();
    factory.set_down("a", true);
    factory.set_down("b", true);
    let connector = connector_with(&factory, &["a", "b"], ConnectionStrategy::ActivePassive);

    let err = connector.connect().await.unwrap_err();
    assert!(err.to_string().contains("ldap://b"));
    assert_eq!(connector.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_endpoint_hits_connect_timeout() {
    let factory = MockFactory::new();
    factory.set_open_delay(Some(Duration::from_secs(30)));
    let config = ConnectionConfig::new(endpoints(&["a"])).with_connect_timeout(Duration::from_secs(1));
    let connector = Connector::new(factory.clone(), config);

    let err = connector.connect().await.unwrap_err();
    assert!(err.is_connect());
    assert_eq!(factory.opened(), 0);
}

#[tokio::test]
async fn pool_initialization_follows_round_robin() {
    let factory = MockFactory::new();
    let pool = SoftLimitPool::new(
        "rr",
        connector_with(&factory, &["a", "b"], ConnectionStrategy::RoundRobin),
        config(4, 4),
    )
    .unwrap();
    pool.initialize().await.unwrap();

    assert_eq!(factory.attempts(), vec!["a", "b", "a", "b"]);
    assert_eq!(pool.connector().opened(), 4);
}
