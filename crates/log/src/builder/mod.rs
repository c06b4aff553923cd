//! Logger builder
//!
//! - `format`: format layer creation macros
//! - `reload`: runtime filter reload

#[macro_use]
pub(crate) mod format;
mod reload;

pub use reload::ReloadHandle;

use tracing_subscriber::{Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Keeps the root span and reload handle alive.
///
/// Drop it at the end of `main`.
#[derive(Debug)]
pub struct LoggerGuard {
    reload_handle: Option<ReloadHandle>,
    _root_span: Option<tracing::span::EnteredSpan>,
}

impl LoggerGuard {
    /// Handle for runtime filter changes, when the config asked for one
    #[must_use]
    pub const fn reload_handle(&self) -> Option<&ReloadHandle> {
        self.reload_handle.as_ref()
    }
}

/// Install the subscriber for a given format layer.
macro_rules! init_subscriber {
    ($filter_layer:expr, $fmt_layer:expr) => {
        Registry::default()
            .with($filter_layer)
            .with($fmt_layer)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))
    };
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub const fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the filter string cannot be parsed
    /// - a global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = reload::parse_filter(&self.config.level)?;
        let (filter_layer, reload_handle) =
            reload::create_filter_layer(filter, &self.config.level, self.config.reloadable);

        let display = &self.config.display;
        match self.config.format {
            Format::Pretty => init_subscriber!(filter_layer, create_fmt_layer!(pretty, display))?,
            Format::Compact => init_subscriber!(filter_layer, create_fmt_layer!(compact, display))?,
            Format::Json => init_subscriber!(filter_layer, create_json_layer!(display))?,
        }

        let root_span = (!self.config.fields.is_empty()).then(|| {
            let fields = &self.config.fields;
            tracing::info_span!(
                "dirpool",
                service = fields.service.as_deref().unwrap_or(""),
                env = fields.env.as_deref().unwrap_or(""),
                version = fields.version.as_deref().unwrap_or(""),
                instance = fields.instance.as_deref().unwrap_or("")
            )
            .entered()
        });

        tracing::debug!(filter = %self.config.level, format = %self.config.format, "logger initialized");
        Ok(LoggerGuard {
            reload_handle,
            _root_span: root_span,
        })
    }
}
