//! Configuration loading and management.
//!
//! Configuration is layered with figment and loaded from (in order of
//! priority, later wins):
//! 1. Default values (compiled in)
//! 2. Config file: `/var/task/telemetry-metadata.toml` (optional)
//! 3. Environment variables with the `LAMBDA_METADATA_` prefix, nested
//!    keys separated by `__`
//!
//! # Environment Variables
//!
//! | Variable | Config Path |
//! |----------|-------------|
//! | `LAMBDA_METADATA_MERGE_ORDER` | `merge_order` (e.g. `static,dynamic,required`) |
//! | `LAMBDA_METADATA_SERVICE__SERVICE` | `service.service` |
//! | `LAMBDA_METADATA_LOG__MESSAGE` | `log.message` |
//! | `LAMBDA_METADATA_METRICS__NAMESPACE` | `metrics.namespace` |
//! | `LAMBDA_METADATA_TRACE__SPAN_NAME` | `trace.span_name` |

use crate::error::Result;
use crate::merge::MergeOrder;
use crate::static_metadata::StaticMetadata;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "/var/task/telemetry-metadata.toml";
const ENV_PREFIX: &str = "LAMBDA_METADATA_";

/// Main configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Static organisational metadata.
    pub service: StaticMetadata,
    /// Merge precedence shared by the log and metric channels.
    pub merge_order: MergeOrder,
    /// Log channel settings.
    pub log: LogConfig,
    /// Metric channel settings.
    pub metrics: MetricsConfig,
    /// Trace channel settings.
    pub trace: TraceConfig,
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration using a custom config file path.
    ///
    /// A missing file is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        tracing::debug!(?config, "Metadata configuration loaded");
        Ok(config)
    }

    /// Creates a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Log channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Message of the informational entry emitted per invocation.
    pub message: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            message: "Hello World".to_string(),
        }
    }
}

/// Metric channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// CloudWatch namespace.
    pub namespace: String,
    /// Value of the `Duration` measurement, in milliseconds.
    pub duration_ms: f64,
    /// Name of the single dimension added per invocation.
    pub dimension_name: String,
    /// Value of the single dimension added per invocation.
    pub dimension_value: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "MyNamespace".to_string(),
            duration_ms: 83.0,
            dimension_name: "User".to_string(),
            dimension_value: "Name".to_string(),
        }
    }
}

/// Trace channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Service name recorded on the span.
    pub service_name: String,
    /// Name of the nested span opened per invocation.
    pub span_name: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            service_name: "MyService".to_string(),
            span_name: "Call the User service and fetch a response".to_string(),
        }
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the static metadata.
    pub fn service(mut self, service: StaticMetadata) -> Self {
        self.config.service = service;
        self
    }

    /// Sets the merge order.
    pub fn merge_order(mut self, order: MergeOrder) -> Self {
        self.config.merge_order = order;
        self
    }

    /// Sets the log message.
    pub fn log_message(mut self, message: impl Into<String>) -> Self {
        self.config.log.message = message.into();
        self
    }

    /// Sets the metrics namespace.
    pub fn metrics_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.metrics.namespace = namespace.into();
        self
    }

    /// Sets the fixed duration measurement.
    pub fn duration_ms(mut self, duration_ms: f64) -> Self {
        self.config.metrics.duration_ms = duration_ms;
        self
    }

    /// Sets the metric dimension.
    pub fn dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.metrics.dimension_name = name.into();
        self.config.metrics.dimension_value = value.into();
        self
    }

    /// Sets the trace service name.
    pub fn trace_service_name(mut self, name: impl Into<String>) -> Self {
        self.config.trace.service_name = name.into();
        self
    }

    /// Sets the nested span name.
    pub fn span_name(mut self, name: impl Into<String>) -> Self {
        self.config.trace.span_name = name.into();
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
