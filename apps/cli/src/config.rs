//! Layered application configuration: defaults, then a TOML file, then
//! `DIRPOOL__`-prefixed environment variables (`__` separates levels, e.g.
//! `DIRPOOL__POOL__MAX_SIZE=20`).

use std::path::Path;

use anyhow::{Context, Result};
use dirpool_pool::{ConnectionConfig, Endpoint, PoolConfig, ValidatorSpec};
use dirpool_resilience::RetryPolicy;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Which pool flavour to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolFlavor {
    /// Hard `max_size` ceiling
    #[default]
    Blocking,
    /// `max_size` is a target
    SoftLimit,
}

/// Everything the binary can be configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pool name
    pub name: String,
    /// Pool flavour
    pub flavor: PoolFlavor,
    /// Sizing, validation and maintenance
    pub pool: PoolConfig,
    /// Endpoints and strategy
    pub connection: ConnectionConfig,
    /// Retry behaviour for operations
    pub retry: RetryPolicy,
    /// Optional connection validator
    pub validator: Option<ValidatorSpec>,
    /// Logging
    pub log: dirpool_log::Config,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            flavor: PoolFlavor::default(),
            pool: PoolConfig::default(),
            connection: ConnectionConfig::new(
                Endpoint::parse("ldap://localhost").into_iter().collect(),
            ),
            retry: RetryPolicy::default(),
            validator: None,
            log: dirpool_log::Config::cli(0),
        }
    }
}

impl AppConfig {
    /// Load and validate configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            anyhow::ensure!(path.exists(), "config file {} not found", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("DIRPOOL__").split("__"));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate().context("invalid [pool] section")?;
        self.connection
            .validate()
            .context("invalid [connection] section")?;
        self.retry.validate().context("invalid [retry] section")?;
        Ok(())
    }
}
