//! Metric channel: one measurement, one dimension, metadata, one flush.
//!
//! The metric channel reads only the invocation context and environment;
//! the inbound event is not consulted. Merged entries are attached to the
//! metric document as metadata, which CloudWatch stores alongside the
//! measurement without turning it into a dimension.

use crate::config::Config;
use crate::env::{
    AWS_EXECUTION_ENV, AWS_LAMBDA_FUNCTION_MEMORY_SIZE, AWS_LAMBDA_FUNCTION_NAME,
    AWS_LAMBDA_FUNCTION_VERSION, AWS_REGION, UNKNOWN, resolve,
};
use crate::error::{MetadataError, Result};
use crate::generated::Generated;
use crate::invocation::Invocation;
use crate::merge::{MergeOrder, MetadataLayers};
use crate::metadata::Metadata;
use crate::static_metadata::StaticMetadata;
use metrics::{Label, Unit};
use metrics_cloudwatch_embedded::{Builder, Collector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::sync::OnceLock;

/// Name of the duration measurement.
pub const DURATION_METRIC: &str = "Duration";

/// CloudWatch metric units.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    /// Seconds.
    Seconds,
    /// Microseconds.
    Microseconds,
    /// Milliseconds.
    Milliseconds,
    /// Bytes.
    Bytes,
    /// Kilobytes.
    Kilobytes,
    /// Megabytes.
    Megabytes,
    /// A plain count.
    Count,
    /// Percent.
    Percent,
    /// Count per second.
    #[serde(rename = "Count/Second")]
    CountPerSecond,
    /// No unit.
    None,
}

impl MetricUnit {
    /// The unit name CloudWatch expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricUnit::Seconds => "Seconds",
            MetricUnit::Microseconds => "Microseconds",
            MetricUnit::Milliseconds => "Milliseconds",
            MetricUnit::Bytes => "Bytes",
            MetricUnit::Kilobytes => "Kilobytes",
            MetricUnit::Megabytes => "Megabytes",
            MetricUnit::Count => "Count",
            MetricUnit::Percent => "Percent",
            MetricUnit::CountPerSecond => "Count/Second",
            MetricUnit::None => "None",
        }
    }

    /// The matching `metrics` unit. [`MetricUnit::None`] has none.
    pub fn to_unit(&self) -> Option<Unit> {
        let unit = match self {
            MetricUnit::Seconds => Unit::Seconds,
            MetricUnit::Microseconds => Unit::Microseconds,
            MetricUnit::Milliseconds => Unit::Milliseconds,
            MetricUnit::Bytes => Unit::Bytes,
            MetricUnit::Kilobytes => Unit::Kibibytes,
            MetricUnit::Megabytes => Unit::Mebibytes,
            MetricUnit::Count => Unit::Count,
            MetricUnit::Percent => Unit::Percent,
            MetricUnit::CountPerSecond => Unit::CountPerSecond,
            MetricUnit::None => return None,
        };
        Some(unit)
    }
}

/// A buffering metrics client.
///
/// Nothing is emitted until [`flush`](Self::flush) is called.
pub trait MetricsRecorder {
    /// Buffers a measurement.
    fn add_metric(&mut self, name: &str, unit: MetricUnit, value: f64);

    /// Adds a dimension to the buffered measurements.
    fn add_dimension(&mut self, name: &str, value: &str);

    /// Attaches a metadata entry to the buffered measurements.
    fn add_metadata(&mut self, key: &str, value: Value);

    /// Publishes everything buffered and clears the buffer.
    fn flush(&mut self) -> Result<()>;
}

/// Assembles and emits the metric channel's metadata.
#[derive(Debug, Clone)]
pub struct MetricChannel {
    static_metadata: Metadata,
    merge_order: MergeOrder,
    duration_ms: f64,
    dimension: (String, String),
}

impl MetricChannel {
    /// Creates a channel with the default measurement and dimension.
    pub fn new(service: &StaticMetadata) -> Self {
        let defaults = crate::config::MetricsConfig::default();
        Self {
            static_metadata: service.service_only(),
            merge_order: MergeOrder::default(),
            duration_ms: defaults.duration_ms,
            dimension: (defaults.dimension_name, defaults.dimension_value),
        }
    }

    /// Creates a channel from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.service)
            .merge_order(config.merge_order)
            .duration_ms(config.metrics.duration_ms)
            .dimension(
                config.metrics.dimension_name.clone(),
                config.metrics.dimension_value.clone(),
            )
    }

    /// Sets the merge order.
    #[must_use]
    pub fn merge_order(mut self, order: MergeOrder) -> Self {
        self.merge_order = order;
        self
    }

    /// Sets the fixed duration measurement.
    #[must_use]
    pub fn duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Sets the dimension added per invocation.
    #[must_use]
    pub fn dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimension = (name.into(), value.into());
        self
    }

    /// Builds the dynamic layer from the context and environment.
    pub fn dynamic_metadata(invocation: &Invocation<'_>) -> Metadata {
        let env = invocation.env();
        let ctx = invocation.context();

        Metadata::new()
            .with("Region", resolve(env, AWS_REGION, UNKNOWN))
            .with("Runtime", resolve(env, AWS_EXECUTION_ENV, UNKNOWN))
            .with(
                "FunctionName",
                resolve(
                    env,
                    AWS_LAMBDA_FUNCTION_NAME,
                    ctx.env_config.function_name.as_str(),
                ),
            )
            .with(
                "FunctionVersion",
                resolve(
                    env,
                    AWS_LAMBDA_FUNCTION_VERSION,
                    ctx.env_config.version.as_str(),
                ),
            )
            .with(
                "FunctionMemorySize",
                resolve(
                    env,
                    AWS_LAMBDA_FUNCTION_MEMORY_SIZE,
                    ctx.env_config.memory.to_string(),
                ),
            )
            .with("LogGroupName", ctx.env_config.log_group.as_str())
            .with("LogStreamName", ctx.env_config.log_stream.as_str())
    }

    /// Builds the required layer.
    pub fn required_metadata(&self, invocation: &Invocation<'_>) -> Metadata {
        let generated: &Generated = invocation.generated();
        Metadata::new()
            .with("CorrelationId", invocation.context().request_id.as_str())
            .with(DURATION_METRIC, self.duration_ms.to_string())
            .with("Id", generated.id())
            .with("Timestamp", generated.timestamp())
            .with("TimestampEpoch", generated.timestamp_epoch())
    }

    /// Builds all three layers without merging them.
    pub fn layers(&self, invocation: &Invocation<'_>) -> MetadataLayers {
        MetadataLayers {
            static_metadata: self.static_metadata.clone(),
            dynamic: Self::dynamic_metadata(invocation),
            required: self.required_metadata(invocation),
        }
    }

    /// Assembles the merged metadata for one invocation.
    pub fn assemble(&self, invocation: &Invocation<'_>) -> Metadata {
        let merged = self.merge_order.merge(&self.layers(invocation));
        tracing::debug!(
            keys = merged.len(),
            merge_order = %self.merge_order,
            "Assembled metric metadata"
        );
        merged
    }

    /// Records the duration and dimension, attaches every metadata entry and
    /// flushes exactly once.
    pub fn emit<M: MetricsRecorder + ?Sized>(
        &self,
        recorder: &mut M,
        metadata: Metadata,
    ) -> Result<()> {
        recorder.add_metric(DURATION_METRIC, MetricUnit::Milliseconds, self.duration_ms);
        recorder.add_dimension(&self.dimension.0, &self.dimension.1);
        for (key, value) in metadata {
            recorder.add_metadata(&key, value);
        }
        recorder.flush()
    }
}

/// Dimension every metric document carries, set when the collector is
/// installed.
pub const SERVICE_DIMENSION: &str = "service";

/// Top-level key holding the Embedded Metric Format directive.
const DIRECTIVE_KEY: &str = "_aws";

type Installed = std::result::Result<(&'static Collector, String), String>;

static COLLECTOR: OnceLock<Installed> = OnceLock::new();

/// Installs the process-wide collector on first use and returns it.
///
/// The collector is the global `metrics` recorder, so namespace and service
/// dimension are fixed by the first caller.
fn collector(namespace: &str, service: &str) -> Result<&'static Collector> {
    let installed = COLLECTOR.get_or_init(|| {
        Builder::new()
            .cloudwatch_namespace(namespace.to_string())
            .with_dimension(SERVICE_DIMENSION, service.to_string())
            .init()
            .map(|collector| (collector, namespace.to_string()))
            .map_err(|e| e.to_string())
    });

    match installed {
        Ok((collector, installed_namespace)) => {
            if installed_namespace != namespace {
                tracing::warn!(
                    requested = namespace,
                    installed = %installed_namespace,
                    "Metrics collector already installed under another namespace"
                );
            }
            Ok(collector)
        }
        Err(e) => Err(MetadataError::MetricsRecorder(e.clone())),
    }
}

/// [`MetricsRecorder`] writing CloudWatch Embedded Metric Format documents
/// through the `metrics_cloudwatch_embedded` collector.
///
/// Measurements are buffered and recorded as histograms on flush, with the
/// buffered dimensions as labels; metadata entries become document
/// properties for that flush only. An entry whose key names a measurement,
/// a dimension or the `_aws` directive is not attached.
pub struct EmfMetrics {
    collector: &'static Collector,
    metrics: Vec<(String, MetricUnit, Vec<f64>)>,
    dimensions: Vec<(String, String)>,
    metadata: Metadata,
    writer: Box<dyn Write + Send>,
}

impl EmfMetrics {
    /// Writes documents to standard output.
    ///
    /// # Errors
    ///
    /// Returns an error if the collector cannot be installed as the global
    /// `metrics` recorder.
    pub fn new(namespace: &str, service: &str) -> Result<Self> {
        Self::with_writer(namespace, service, std::io::stdout())
    }

    /// Creates a recorder from loaded configuration.
    ///
    /// # Errors
    ///
    /// See [`EmfMetrics::new`].
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.metrics.namespace, &config.service.service)
    }

    /// Writes documents to `writer`.
    ///
    /// # Errors
    ///
    /// See [`EmfMetrics::new`].
    pub fn with_writer(
        namespace: &str,
        service: &str,
        writer: impl Write + Send + 'static,
    ) -> Result<Self> {
        Ok(Self {
            collector: collector(namespace, service)?,
            metrics: Vec::new(),
            dimensions: Vec::new(),
            metadata: Metadata::new(),
            writer: Box::new(writer),
        })
    }

    fn shadowed(&self, key: &str) -> bool {
        key == DIRECTIVE_KEY
            || key == SERVICE_DIMENSION
            || self.metrics.iter().any(|(name, _, _)| name == key)
            || self.dimensions.iter().any(|(name, _)| name == key)
    }

    fn record(&self) {
        let labels: Vec<Label> = self
            .dimensions
            .iter()
            .map(|(name, value)| Label::new(name.clone(), value.clone()))
            .collect();

        for (name, unit, values) in &self.metrics {
            if let Some(unit) = unit.to_unit() {
                metrics::describe_histogram!(name.clone(), unit, "");
            }
            let histogram = metrics::histogram!(name.clone(), labels.clone());
            for value in values {
                histogram.record(*value);
            }
        }
    }

    fn clear(&mut self) {
        self.metrics.clear();
        self.dimensions.clear();
        self.metadata = Metadata::new();
    }
}

impl std::fmt::Debug for EmfMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmfMetrics")
            .field("metrics", &self.metrics)
            .field("dimensions", &self.dimensions)
            .field("metadata", &self.metadata.len())
            .finish_non_exhaustive()
    }
}

impl MetricsRecorder for EmfMetrics {
    fn add_metric(&mut self, name: &str, unit: MetricUnit, value: f64) {
        match self.metrics.iter_mut().find(|(n, _, _)| n == name) {
            Some((_, _, values)) => values.push(value),
            None => self.metrics.push((name.to_string(), unit, vec![value])),
        }
    }

    fn add_dimension(&mut self, name: &str, value: &str) {
        if name == SERVICE_DIMENSION {
            tracing::warn!(value, "The service dimension is fixed when the collector is installed");
            return;
        }
        match self.dimensions.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.dimensions.push((name.to_string(), value.to_string())),
        }
    }

    fn add_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key, value);
    }

    fn flush(&mut self) -> Result<()> {
        if self.metrics.is_empty() {
            tracing::warn!("No metrics to publish");
            self.clear();
            return Ok(());
        }

        self.record();

        let properties: Vec<(String, Value)> = self
            .metadata
            .iter()
            .filter(|(key, _)| !self.shadowed(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in &properties {
            self.collector.set_property(key.clone(), value.clone());
        }

        let written = self.collector.flush(&mut self.writer);
        for (key, _) in &properties {
            self.collector.remove_property(key.as_str());
        }
        self.clear();
        written?;
        Ok(())
    }
}
