//! Pool configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sizing, validation and maintenance settings for a pool.
///
/// Frozen when the pool is initialized; see
/// [`Settings`](crate::settings::Settings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened at initialization and kept as a floor
    pub min_size: usize,
    /// Ceiling for the blocking pool; a target for the soft-limit pool
    pub max_size: usize,
    /// Validate a connection before handing it out
    pub validate_on_checkout: bool,
    /// Validate a connection when it is returned
    pub validate_on_checkin: bool,
    /// Validate idle connections in the background
    pub validate_periodically: bool,
    /// Interval between background validation runs
    #[serde(with = "humantime_serde")]
    pub validate_period: Duration,
    /// Interval between prune runs; zero disables pruning
    #[serde(with = "humantime_serde")]
    pub prune_period: Duration,
    /// Idle time after which a connection may be pruned
    #[serde(with = "humantime_serde")]
    pub expiration_time: Duration,
    /// Longest a blocking checkout waits; `None` waits until shutdown
    #[serde(with = "humantime_serde")]
    pub block_wait_time: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 3,
            max_size: 10,
            validate_on_checkout: false,
            validate_on_checkin: false,
            validate_periodically: false,
            validate_period: Duration::from_secs(1800),
            prune_period: Duration::from_secs(300),
            expiration_time: Duration::from_secs(600),
            block_wait_time: None,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        if self.min_size > self.max_size {
            return Err(Error::configuration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.validate_periodically && self.validate_period.is_zero() {
            return Err(Error::configuration(
                "validate_period must be greater than zero when validate_periodically is set",
            ));
        }
        if self.block_wait_time.is_some_and(|wait| wait.is_zero()) {
            return Err(Error::configuration(
                "block_wait_time must be greater than zero (omit it to wait indefinitely)",
            ));
        }
        Ok(())
    }

    /// Whether the background pruner runs
    #[must_use]
    pub const fn prunes(&self) -> bool {
        !self.prune_period.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.min_size, 3);
        assert_eq!(config.max_size, 10);
        assert_eq!(config.validate_period, Duration::from_secs(30 * 60));
        assert_eq!(config.prune_period, Duration::from_secs(5 * 60));
        assert_eq!(config.expiration_time, Duration::from_secs(10 * 60));
        assert!(config.block_wait_time.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation() {
        assert!(PoolConfig { max_size: 0, ..Default::default() }.validate().is_err());
        assert!(PoolConfig { min_size: 11, max_size: 10, ..Default::default() }.validate().is_err());
        assert!(
            PoolConfig {
                validate_periodically: true,
                validate_period: Duration::ZERO,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            PoolConfig { block_wait_time: Some(Duration::ZERO), ..Default::default() }
                .validate()
                .is_err()
        );
        assert!(PoolConfig { min_size: 0, max_size: 1, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn zero_prune_period_disables_pruning() {
        let config = PoolConfig { prune_period: Duration::ZERO, ..Default::default() };
        assert!(!config.prunes());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserializes_humantime_durations() {
        let config: PoolConfig = toml::from_str(
            r#"
            min_size = 1
            max_size = 4
            validate_on_checkout = true
            prune_period = "1m"
            expiration_time = "90s"
            block_wait_time = "250ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.min_size, 1);
        assert_eq!(config.max_size, 4);
        assert!(config.validate_on_checkout);
        assert_eq!(config.prune_period, Duration::from_secs(60));
        assert_eq!(config.expiration_time, Duration::from_secs(90));
        assert_eq!(config.block_wait_time, Some(Duration::from_millis(250)));
        assert_eq!(config.validate_period, Duration::from_secs(1800));
    }
}
