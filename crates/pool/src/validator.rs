//! Connection validators
//!
//! A validator answers one question: is this connection still worth
//! handing out? It never fails; probe errors and timeouts count as
//! "invalid".

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::connection::{CompareRequest, DirectoryProbe, SearchRequest};
use crate::error::{Error, Result};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health probe run against a connection.
#[async_trait]
pub trait Validator<C: Send>: Send + Sync + fmt::Debug {
    /// `true` when the connection is healthy.
    async fn validate(&self, conn: &mut C) -> bool;
}

/// Probes with a compare operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareValidator {
    /// Entry to compare against
    pub dn: String,
    /// Attribute to compare
    pub attribute: String,
    /// Value expected to match
    pub value: String,
    /// Probe time limit
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CompareValidator {
    fn default() -> Self {
        Self {
            dn: String::new(),
            attribute: "objectClass".to_string(),
            value: "top".to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[async_trait]
impl<C: DirectoryProbe> Validator<C> for CompareValidator {
    async fn validate(&self, conn: &mut C) -> bool {
        let request = CompareRequest {
            dn: self.dn.clone(),
            attribute: self.attribute.clone(),
            value: self.value.clone(),
        };
        match tokio::time::timeout(self.timeout, conn.compare(&request)).await {
            Ok(Ok(matched)) => matched,
            Ok(Err(err)) => {
                debug!(dn = %self.dn, error = %err, "compare probe failed");
                false
            }
            Err(_) => {
                debug!(dn = %self.dn, timeout_ms = self.timeout.as_millis(), "compare probe timed out");
                false
            }
        }
    }
}

/// Probes with an object-scope search that must return an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchValidator {
    /// Entry the search is scoped to
    pub base_dn: String,
    /// Search filter
    pub filter: String,
    /// Probe time limit
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for SearchValidator {
    fn default() -> Self {
        Self {
            base_dn: String::new(),
            filter: "(objectClass=*)".to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[async_trait]
impl<C: DirectoryProbe> Validator<C> for SearchValidator {
    async fn validate(&self, conn: &mut C) -> bool {
        let request = SearchRequest {
            base_dn: self.base_dn.clone(),
            filter: self.filter.clone(),
            size_limit: 1,
        };
        match tokio::time::timeout(self.timeout, conn.search(&request)).await {
            Ok(Ok(found)) => found > 0,
            Ok(Err(err)) => {
                debug!(base_dn = %self.base_dn, error = %err, "search probe failed");
                false
            }
            Err(_) => {
                debug!(base_dn = %self.base_dn, timeout_ms = self.timeout.as_millis(), "search probe timed out");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Validator selection as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    /// Registry key, e.g. `"compare"`
    pub kind: String,
    /// Constructor parameters
    #[serde(default)]
    pub params: Value,
}

type Constructor<C> = Box<dyn Fn(Value) -> Result<Arc<dyn Validator<C>>> + Send + Sync>;

/// Maps configuration keys to validator constructors.
pub struct ValidatorRegistry<C: Send> {
    constructors: HashMap<String, Constructor<C>>,
}

impl<C: Send + 'static> ValidatorRegistry<C> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register `constructor` under `key`, replacing any previous entry.
    pub fn register<K, F>(&mut self, key: K, constructor: F)
    where
        K: Into<String>,
        F: Fn(Value) -> Result<Arc<dyn Validator<C>>> + Send + Sync + 'static,
    {
        self.constructors.insert(key.into(), Box::new(constructor));
    }

    /// Whether `key` has a constructor
    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Build the validator described by `spec`.
    pub fn build(&self, spec: &ValidatorSpec) -> Result<Arc<dyn Validator<C>>> {
        let constructor = self
            .constructors
            .get(&spec.kind)
            .ok_or_else(|| Error::UnknownValidator {
                kind: spec.kind.clone(),
            })?;
        let params = match &spec.params {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        constructor(params)
    }
}

impl<C: DirectoryProbe> ValidatorRegistry<C> {
    /// A registry with `compare` and `search` pre-registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("compare", |params| {
            let validator: CompareValidator = parse_params("compare", params)?;
            Ok(Arc::new(validator) as Arc<dyn Validator<C>>)
        });
        registry.register("search", |params| {
            let validator: SearchValidator = parse_params("search", params)?;
            Ok(Arc::new(validator) as Arc<dyn Validator<C>>)
        });
        registry
    }
}

impl<C: Send + 'static> Default for ValidatorRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send> fmt::Debug for ValidatorRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.constructors.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ValidatorRegistry").field("keys", &keys).finish()
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(kind: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::configuration(format!("invalid '{kind}' validator parameters: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnection, MockFactory};
    use crate::{ConnectionFactory, Endpoint};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn connection(factory: &MockFactory) -> MockConnection {
        factory
            .create(&Endpoint::parse("ldap://a.example").unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn compare_validator_reflects_probe() {
        let factory = MockFactory::new();
        let mut conn = connection(&factory).await;
        let validator = CompareValidator::default();
        assert!(validator.validate(&mut conn).await);

        factory.poison_existing();
        assert!(!validator.validate(&mut conn).await);
    }

    #[tokio::test]
    async fn search_validator_reflects_probe() {
        let factory = MockFactory::new();
        let mut conn = connection(&factory).await;
        let validator = SearchValidator::default();
        assert!(validator.validate(&mut conn).await);

        factory.set_healthy(false);
        assert!(!validator.validate(&mut conn).await);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_counts_as_invalid() {
        let factory = MockFactory::new();
        let mut conn = connection(&factory).await;
        factory.set_probe_delay(Some(Duration::from_secs(30)));
        let validator = CompareValidator {
            timeout: Duration::from_secs(1),
            ..CompareValidator::default()
        };
        assert!(!validator.validate(&mut conn).await);
    }

    #[test]
    fn registry_builds_builtins_from_params() {
        let registry = ValidatorRegistry::<MockConnection>::with_builtins();
        assert_eq!(registry.keys(), vec!["compare", "search"]);

        let spec = ValidatorSpec {
            kind: "compare".into(),
            params: json!({ "dn": "ou=people,dc=example,dc=org", "timeout": "2s" }),
        };
        let validator = registry.build(&spec).unwrap();
        assert!(format!("{validator:?}").contains("ou=people"));

        let bare = ValidatorSpec {
            kind: "search".into(),
            params: Value::Null,
        };
        assert!(registry.build(&bare).is_ok());
    }

    #[test]
    fn registry_rejects_unknown_kind_and_bad_params() {
        let registry = ValidatorRegistry::<MockConnection>::with_builtins();
        let unknown = ValidatorSpec {
            kind: "bind".into(),
            params: Value::Null,
        };
        assert!(matches!(
            registry.build(&unknown),
            Err(Error::UnknownValidator { .. })
        ));

        let bad = ValidatorSpec {
            kind: "compare".into(),
            params: json!({ "timeout": "soon" }),
        };
        assert!(registry.build(&bad).unwrap_err().is_configuration());
    }

    #[test]
    fn registry_accepts_custom_constructors() {
        #[derive(Debug)]
        struct AlwaysValid;

        #[async_trait]
        impl Validator<MockConnection> for AlwaysValid {
            async fn validate(&self, _conn: &mut MockConnection) -> bool {
                true
            }
        }

        let mut registry = ValidatorRegistry::<MockConnection>::new();
        registry.register("always", |_| Ok(Arc::new(AlwaysValid) as Arc<dyn Validator<_>>));
        assert!(registry.contains("always"));
        assert!(!registry.contains("compare"));
    }
}
