//! Property tests for blocking-pool size accounting.

mod common;

use std::time::Duration;

use common::{config, connector};
use dirpool_pool::testing::MockFactory;
use dirpool_pool::{BlockingPool, ConnectionPool, PoolConfig};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Checkout,
    Checkin,
    Invalidate,
    Prune,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::Checkout),
        3 => Just(Step::Checkin),
        1 => Just(Step::Invalidate),
        1 => Just(Step::Prune),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn total_never_exceeds_max_size(
        min in 0usize..3,
        extra in 0usize..4,
        steps in prop::collection::vec(step(), 1..60),
    ) {
        let max = min + extra + 1;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async move {
            let factory = MockFactory::new();
            let pool = BlockingPool::new(
                "prop",
                connector(&factory, &["a"]),
                PoolConfig {
                    block_wait_time: Some(Duration::from_millis(5)),
                    prune_period: Duration::from_secs(3600),
                    expiration_time: Duration::from_secs(1),
                    ..config(min, max)
                },
            )
            .unwrap();
            pool.initialize().await.unwrap();

            let mut held = Vec::new();
            for step in steps {
                match step {
                    Step::Checkout => match pool.get_connection().await {
                        Ok(conn) => held.push(conn),
                        Err(err) => assert!(err.is_pool_exhausted()),
                    },
                    Step::Checkin => {
                        if let Some(conn) = held.pop() {
                            pool.checkin(conn).await;
                        }
                    }
                    Step::Invalidate => {
                        if let Some(mut conn) = held.pop() {
                            conn.invalidate();
                            pool.checkin(conn).await;
                        }
                    }
                    Step::Prune => {
                        tokio::time::advance(Duration::from_secs(2)).await;
                        pool.prune().await;
                    }
                }

                let stats = pool.stats();
                assert!(stats.total() <= max, "{stats:?} exceeds {max}");
                assert_eq!(stats.active, held.len());
                assert_eq!(stats.pending, 0);
                assert!(stats.total() >= min, "{stats:?} below {min}");
                assert_eq!(factory.live(), stats.total());
            }

            for conn in held {
                pool.checkin(conn).await;
            }
            pool.close().await;
            assert_eq!(factory.live(), 0);
        });
    }
}
