//! Logger configuration

mod presets;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Complete logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter directives, `RUST_LOG` syntax (e.g. `"info,dirpool_pool=debug"`)
    pub level: String,
    /// Output format
    pub format: Format,
    /// What each line shows
    pub display: DisplayConfig,
    /// Fields attached to every event through a root span
    pub fields: Fields,
    /// Return a [`ReloadHandle`](crate::ReloadHandle) for runtime filter changes
    pub reloadable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            display: DisplayConfig::default(),
            fields: Fields::default(),
            reloadable: false,
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for Format {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LogError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Display toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DisplayConfig {
    /// ANSI colors
    pub colors: bool,
    /// Timestamps
    pub time: bool,
    /// Source file and line
    pub source: bool,
    /// Event target (module path)
    pub target: bool,
    /// Thread ids
    pub thread_ids: bool,
    /// JSON only: put event fields at the top level
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            time: true,
            source: false,
            target: true,
            thread_ids: false,
            flatten: false,
        }
    }
}

impl DisplayConfig {
    /// Apply `DIRPOOL_LOG_COLORS`, `DIRPOOL_LOG_TIME` and `DIRPOOL_LOG_SOURCE`.
    pub fn parse_env(&mut self) {
        if let Some(colors) = env_flag("DIRPOOL_LOG_COLORS") {
            self.colors = colors;
        }
        if let Some(time) = env_flag("DIRPOOL_LOG_TIME") {
            self.time = time;
        }
        if let Some(source) = env_flag("DIRPOOL_LOG_SOURCE") {
            self.source = source;
        }
    }
}

/// Global fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fields {
    /// Service name
    pub service: Option<String>,
    /// Deployment environment
    pub env: Option<String>,
    /// Service version
    pub version: Option<String>,
    /// Instance identifier
    pub instance: Option<String>,
}

impl Fields {
    /// Read `DIRPOOL_SERVICE`, `DIRPOOL_ENV`, `DIRPOOL_VERSION` and
    /// `DIRPOOL_INSTANCE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service: std::env::var("DIRPOOL_SERVICE").ok(),
            env: std::env::var("DIRPOOL_ENV").ok(),
            version: std::env::var("DIRPOOL_VERSION").ok(),
            instance: std::env::var("DIRPOOL_INSTANCE").ok(),
        }
    }

    /// Whether no field is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.env.is_none()
            && self.version.is_none()
            && self.instance.is_none()
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|value| parse_flag(&value))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
