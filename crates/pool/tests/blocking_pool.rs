//! Blocking pool: hard ceiling, waiting checkouts and timeouts.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{config, connector, settle};
use dirpool_pool::testing::MockFactory;
use dirpool_pool::{BlockingPool, ConnectionPool, Error, PoolConfig};
use pretty_assertions::assert_eq;
use tokio::task::JoinSet;

fn pool_with(factory: &MockFactory, config: PoolConfig) -> BlockingPool<MockFactory> {
    BlockingPool::new("blocking", connector(factory, &["a"]), config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn checkout_times_out_when_exhausted() {
    let factory = MockFactory::new();
    let pool = pool_with(
        &factory,
        PoolConfig {
            block_wait_time: Some(Duration::from_millis(100)),
            ..config(0, 2)
        },
    );
    pool.initialize().await.unwrap();

    let _first = pool.get_connection().await.unwrap();
    let _second = pool.get_connection().await.unwrap();
    let err = pool.get_connection().await.unwrap_err();

    assert!(err.is_pool_exhausted());
    match err {
        Error::BlockingTimeout {
            waited, max_size, ..
        } => {
            assert!(waited >= Duration::from_millis(100));
            assert_eq!(max_size, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pool.stats().blocking_timeouts, 1);
    assert_eq!(factory.opened(), 2);
}

#[tokio::test]
async fn waiting_checkout_gets_the_returned_connection() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, config(1, 1));
    pool.initialize().await.unwrap();

    let held = pool.get_connection().await.unwrap();
    let held_id = held.id();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let conn = pool.get_connection().await?;
            let id = conn.id();
            pool.checkin(conn).await;
            Ok::<_, Error>(id)
        })
    };
    settle().await;
    assert!(!waiter.is_finished());

    pool.checkin(held).await;
    let id = waiter.await.unwrap().unwrap();
    assert_eq!(id, held_id);
    assert_eq!(factory.opened(), 1);
}

#[tokio::test]
async fn close_wakes_waiting_checkouts() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, config(1, 1));
    pool.initialize().await.unwrap();

    let _held = pool.get_connection().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.get_connection().await.map(|conn| conn.id()) })
    };
    settle().await;

    pool.close().await;
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::Closed { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_exceeds_max_size_under_contention() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, config(1, 4));
    pool.initialize().await.unwrap();

    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut tasks = JoinSet::new();
    for _ in 0..32 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        let peak = Arc::clone(&peak);
        tasks.spawn(async move {
            let conn = pool.get_connection().await.unwrap();
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            in_use.fetch_sub(1, Ordering::SeqCst);
            pool.checkin(conn).await;
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert!(factory.opened() <= 4);
    let stats = pool.stats();
    assert_eq!(stats.checkouts, 32);
    assert_eq!(stats.active, 0);
    assert!(stats.total() <= 4);
}

#[tokio::test(start_paused = true)]
async fn reuses_idle_connections_before_opening() {
    let factory = MockFactory::new();
    let pool = pool_with(&factory, config(2, 5));
    pool.initialize().await.unwrap();

    for _ in 0..10 {
        let conn = pool.get_connection().await.unwrap();
        pool.checkin(conn).await;
    }
    assert_eq!(factory.opened(), 2);
    assert_eq!(pool.stats().checkouts, 10);
    assert_eq!(pool.stats().checkins, 10);
}
