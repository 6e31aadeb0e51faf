//! # Watchman Configuration System
//!
//! YAML-based configuration with environment-specific overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use watchman::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let config = ConfigManager::load()?;
//!
//! let source = config.config().source;
//! let routed_events = config.config().event_handlers.len();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event_handlers;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::events::EventSource;

pub use error::{ConfigResult, ConfigurationError};
pub use event_handlers::{ActionSpec, EventHandlerConfig, EventHandlerTable};
pub use loader::ConfigManager;

/// Root configuration structure mirroring watchman.yaml
///
/// Unknown top-level keys are ignored here but stay available to actions through
/// [`ConfigManager::raw`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchmanConfig {
    /// Service identification
    #[serde(default)]
    pub service: ServiceConfig,

    /// Which stream this consumer reads
    pub source: EventSource,

    /// Event name to action list mapping
    #[serde(default, alias = "eventHandlers")]
    pub event_handlers: EventHandlerTable,

    /// Per-action timing metrics
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Configuration reload polling
    #[serde(default)]
    pub reload: ReloadConfig,
}

impl WatchmanConfig {
    /// Configuration with defaults for everything except the stream source
    pub fn for_source(source: EventSource) -> Self {
        Self {
            service: ServiceConfig::default(),
            source,
            event_handlers: EventHandlerTable::default(),
            metrics: MetricsConfig::default(),
            reload: ReloadConfig::default(),
        }
    }

    /// Validate configuration values that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.service.name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "service.name",
                &self.service.name,
                "service name must not be empty",
            ));
        }

        if self.metrics.enabled && self.metrics.flush_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "metrics.flush_interval_ms",
                "0",
                "flush interval must be positive when metrics are enabled",
            ));
        }

        if self.reload.enabled && self.reload.interval_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "reload.interval_secs",
                "0",
                "reload interval must be positive when reload is enabled",
            ));
        }

        for (event, handler) in self.event_handlers.iter() {
            if event.trim().is_empty() {
                return Err(ConfigurationError::validation_error(
                    "event_handlers contains an empty event name",
                ));
            }
            if let Some(spec) = handler.actions.iter().find(|s| s.name().trim().is_empty()) {
                return Err(ConfigurationError::invalid_value(
                    format!("event_handlers.{event}.actions"),
                    spec.name(),
                    "action name must not be empty",
                ));
            }
        }

        Ok(())
    }
}

/// Service identification
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "watchman".to_string()
}

/// Per-action timing metric configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub namespace: String,
    pub region: String,
    pub metric_name: String,
    pub flush_interval_ms: u64,
    pub auto_flush: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "Watchman".to_string(),
            region: "us-east-1".to_string(),
            metric_name: "ActionDuration".to_string(),
            flush_interval_ms: 60_000,
            auto_flush: true,
        }
    }
}

impl MetricsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Configuration file polling used to hot-reload the event handler table
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

impl ReloadConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
