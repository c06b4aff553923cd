//! Named pool registry.

mod common;

use common::{config, connector};
use dirpool_pool::testing::MockFactory;
use dirpool_pool::{ConnectionPool, Error, PoolRegistry, SoftLimitPool};
use pretty_assertions::assert_eq;

fn pool(factory: &MockFactory, name: &str, min: usize) -> SoftLimitPool<MockFactory> {
    SoftLimitPool::new(name, connector(factory, &["a"]), config(min, 4)).unwrap()
}

#[tokio::test]
async fn registers_initializes_and_closes_pools() {
    let factory = MockFactory::new();
    let registry = PoolRegistry::new();
    registry.register(pool(&factory, "users", 2)).unwrap();
    registry.register(pool(&factory, "groups", 1)).unwrap();

    assert_eq!(registry.names(), vec!["groups", "users"]);
    assert_eq!(registry.len(), 2);

    registry.initialize_all().await.unwrap();
    assert_eq!(factory.opened(), 3);
    assert_eq!(registry.get("users").unwrap().available_count(), 2);

    registry.close().await;
    assert!(registry.is_empty());
    assert_eq!(factory.live(), 0);
}

#[test]
fn duplicate_names_are_rejected() {
    let factory = MockFactory::new();
    let registry = PoolRegistry::new();
    registry.register(pool(&factory, "users", 0)).unwrap();

    let err = registry.register(pool(&factory, "users", 0)).unwrap_err();
    assert!(matches!(err, Error::DuplicatePool { ref name } if name == "users"));
    assert!(err.is_configuration());
}

#[tokio::test]
async fn initialize_all_stops_at_the_first_failure() {
    let factory = MockFactory::new();
    factory.set_down("a", true);
    let registry = PoolRegistry::new();
    registry.register(pool(&factory, "users", 1)).unwrap();

    let err = registry.initialize_all().await.unwrap_err();
    assert!(err.is_connect());

    let removed = registry.remove("users").unwrap();
    assert!(matches!(
        removed.get_connection().await,
        Err(Error::NotInitialized { .. })
    ));
    assert!(registry.get("users").is_none());
}
