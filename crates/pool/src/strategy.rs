//! Endpoint selection and connection opening.
//!
//! A [`Connector`] bundles a factory, the list of equivalent endpoints and
//! the [`ConnectionStrategy`] that orders them. Pools only ever call
//! [`Connector::connect`]; endpoint topology stays out of the pool core.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection::ConnectionFactory;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::settings::Settings;

/// Order in which endpoints are tried when opening a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStrategy {
    /// Only the first endpoint
    #[default]
    Single,
    /// Configured order; later endpoints are failovers
    ActivePassive,
    /// Rotate the starting endpoint after every successful open
    RoundRobin,
    /// Fresh random order for every open
    Random,
}

impl ConnectionStrategy {
    /// Endpoints to try, in order, given `opened` successful opens so far.
    #[must_use]
    pub fn order<'a>(self, endpoints: &'a [Endpoint], opened: usize) -> Vec<&'a Endpoint> {
        match self {
            Self::Single => endpoints.iter().take(1).collect(),
            Self::ActivePassive => endpoints.iter().collect(),
            Self::RoundRobin => {
                let mut ordered: Vec<_> = endpoints.iter().collect();
                if !ordered.is_empty() {
                    ordered.rotate_left(opened % endpoints.len());
                }
                ordered
            }
            Self::Random => {
                let mut ordered: Vec<_> = endpoints.iter().collect();
                fastrand::shuffle(&mut ordered);
                ordered
            }
        }
    }

    /// Configuration key
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::ActivePassive => "active_passive",
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for ConnectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single" | "default" => Ok(Self::Single),
            "active_passive" | "failover" => Ok(Self::ActivePassive),
            "round_robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            other => Err(Error::configuration(format!(
                "unknown connection strategy '{other}'"
            ))),
        }
    }
}

/// Transport configuration for a [`Connector`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Equivalent servers
    pub endpoints: Vec<Endpoint>,
    /// How endpoints are ordered for each open
    pub strategy: ConnectionStrategy,
    /// Limit on a single open attempt
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Configuration for the given endpoints with the default strategy
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            ..Self::default()
        }
    }

    /// Set the strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: ConnectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the per-attempt open timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::configuration(
                "connect_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Factory plus endpoint topology.
pub struct Connector<F: ConnectionFactory> {
    factory: F,
    config: Settings<ConnectionConfig>,
    opened: AtomicUsize,
}

impl<F: ConnectionFactory> Connector<F> {
    /// Create a connector.
    pub fn new(factory: F, config: ConnectionConfig) -> Self {
        Self {
            factory,
            config: Settings::new("connection", config),
            opened: AtomicUsize::new(0),
        }
    }

    /// The wrapped factory
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Transport configuration; frozen once a pool using it is initialized
    pub const fn config(&self) -> &Settings<ConnectionConfig> {
        &self.config
    }

    /// Successful opens so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Open a connection, trying endpoints in strategy order.
    ///
    /// A failed endpoint moves on to the next one; the last failure is
    /// returned when every endpoint fails.
    pub async fn connect(&self) -> Result<F::Connection> {
        let (candidates, timeout) = {
            let config = self.config.read();
            let ordered: Vec<Endpoint> = config
                .strategy
                .order(&config.endpoints, self.opened())
                .into_iter()
                .cloned()
                .collect();
            (ordered, config.connect_timeout)
        };

        let mut last_error = None;
        for endpoint in candidates {
            match self.open(&endpoint, timeout).await {
                Ok(conn) => {
                    self.opened.fetch_add(1, Ordering::Relaxed);
                    debug!(endpoint = %endpoint, "opened directory connection");
                    return Ok(conn);
                }
                Err(err) => {
                    warn!(endpoint = %endpoint, error = %err, "failed to open directory connection");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(Error::NoEndpoints))
    }

    async fn open(&self, endpoint: &Endpoint, timeout: Option<Duration>) -> Result<F::Connection> {
        let attempt = self.factory.create(endpoint);
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result.map_err(|e| Error::connect(endpoint, e)),
                Err(elapsed) => Err(Error::connect(endpoint, elapsed)),
            },
            None => attempt.await.map_err(|e| Error::connect(endpoint, e)),
        }
    }
}

impl<F: ConnectionFactory + fmt::Debug> fmt::Debug for Connector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("factory", &self.factory)
            .field("config", &self.config)
            .field("opened", &self.opened())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn endpoints(hosts: &[&str]) -> Vec<Endpoint> {
        hosts
            .iter()
            .map(|h| Endpoint::parse(&format!("ldap://{h}")).unwrap())
            .collect()
    }

    fn hosts(order: Vec<&Endpoint>) -> Vec<&str> {
        order.into_iter().map(Endpoint::host).collect()
    }

    #[test]
    fn single_uses_first_endpoint_only() {
        let eps = endpoints(&["a", "b", "c"]);
        assert_eq!(hosts(ConnectionStrategy::Single.order(&eps, 5)), vec!["a"]);
    }

    #[test]
    fn active_passive_keeps_order() {
        let eps = endpoints(&["a", "b", "c"]);
        assert_eq!(
            hosts(ConnectionStrategy::ActivePassive.order(&eps, 7)),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn round_robin_rotates() {
        let eps = endpoints(&["a", "b", "c"]);
        let rr = ConnectionStrategy::RoundRobin;
        assert_eq!(hosts(rr.order(&eps, 0)), vec!["a", "b", "c"]);
        assert_eq!(hosts(rr.order(&eps, 1)), vec!["b", "c", "a"]);
        assert_eq!(hosts(rr.order(&eps, 5)), vec!["c", "a", "b"]);
        assert!(rr.order(&[], 3).is_empty());
    }

    #[test]
    fn random_is_a_permutation() {
        let eps = endpoints(&["a", "b", "c", "d"]);
        let mut got = hosts(ConnectionStrategy::Random.order(&eps, 0));
        got.sort_unstable();
        assert_eq!(got, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn parses_config_keys() {
        assert_eq!(
            "round-robin".parse::<ConnectionStrategy>().unwrap(),
            ConnectionStrategy::RoundRobin
        );
        assert_eq!(
            "DEFAULT".parse::<ConnectionStrategy>().unwrap(),
            ConnectionStrategy::Single
        );
        assert!("sticky".parse::<ConnectionStrategy>().is_err());
    }

    #[test]
    fn config_requires_endpoints() {
        assert!(matches!(
            ConnectionConfig::default().validate(),
            Err(Error::NoEndpoints)
        ));
        let config = ConnectionConfig::new(endpoints(&["a"]))
            .with_connect_timeout(Duration::ZERO);
        assert!(config.validate().unwrap_err().is_configuration());
    }
}
