//! Log channel: persistent logger attributes.
//!
//! The merged metadata becomes the persistent attributes of a logger built
//! once per invocation, followed by a single informational entry.
//!
//! | Key | Category | Source |
//! |-----|----------|--------|
//! | `owner`, `domain`, `service`, ... | static | [`StaticMetadata`] |
//! | `accountId`, `stage`, `user` | dynamic | request context |
//! | `region`, `runtime` | dynamic | environment, else `UNKNOWN` |
//! | `functionName`, `functionVersion`, `functionMemorySize` | dynamic | environment, else invocation context |
//! | `correlationId` | dynamic | invocation request id |
//! | `timestampRequest`, `resource`, `viewerCountry` | dynamic | request |
//! | `level`, `error`, `httpStatusCode` | required | channel defaults |
//! | `id`, `timestamp`, `timestampEpoch` | required | [`Generated`] |

use crate::config::Config;
use crate::env::{
    AWS_EXECUTION_ENV, AWS_LAMBDA_FUNCTION_MEMORY_SIZE, AWS_LAMBDA_FUNCTION_NAME,
    AWS_LAMBDA_FUNCTION_VERSION, AWS_REGION, UNKNOWN, resolve,
};
use crate::error::Result;
use crate::generated::Generated;
use crate::invocation::Invocation;
use crate::merge::{MergeOrder, MetadataLayers};
use crate::metadata::Metadata;
use crate::request::{CLOUDFRONT_VIEWER_COUNTRY, GatewayRequest};
use crate::static_metadata::StaticMetadata;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

/// A logger carrying persistent attributes.
pub trait Logger {
    /// Emits an informational entry.
    fn info(&self, message: &str) -> Result<()>;
}

/// Creates loggers bound to a service name and persistent attributes.
pub trait LoggerProvider {
    /// The logger type produced.
    type Logger: Logger;

    /// Constructs a logger whose every entry carries `persistent_attributes`.
    fn logger(&self, service_name: &str, persistent_attributes: Metadata) -> Self::Logger;
}

/// Assembles and emits the log channel's metadata.
#[derive(Debug, Clone)]
pub struct LogChannel {
    static_metadata: Metadata,
    service_name: String,
    merge_order: MergeOrder,
    message: String,
}

impl LogChannel {
    /// Creates a channel with the default merge order and message.
    pub fn new(service: &StaticMetadata) -> Self {
        Self {
            static_metadata: service.to_metadata(),
            service_name: service.service.clone(),
            merge_order: MergeOrder::default(),
            message: crate::config::LogConfig::default().message,
        }
    }

    /// Creates a channel from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.service)
            .merge_order(config.merge_order)
            .message(config.log.message.clone())
    }

    /// Sets the merge order.
    #[must_use]
    pub fn merge_order(mut self, order: MergeOrder) -> Self {
        self.merge_order = order;
        self
    }

    /// Sets the message of the per-invocation entry.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Service name passed to the logger.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Builds the dynamic layer from the request, context and environment.
    pub fn dynamic_metadata<R: GatewayRequest>(
        request: &R,
        invocation: &Invocation<'_>,
    ) -> Metadata {
        let env = invocation.env();
        let ctx = invocation.context();

        let mut metadata = Metadata::new();
        metadata.insert("accountId", optional(request.account_id()));
        metadata.insert("region", resolve(env, AWS_REGION, UNKNOWN));
        metadata.insert("runtime", resolve(env, AWS_EXECUTION_ENV, UNKNOWN));
        metadata.insert("user", optional(request.user()));
        metadata.insert("stage", optional(request.stage()));
        metadata.insert(
            "functionName",
            resolve(
                env,
                AWS_LAMBDA_FUNCTION_NAME,
                ctx.env_config.function_name.as_str(),
            ),
        );
        metadata.insert(
            "functionVersion",
            resolve(
                env,
                AWS_LAMBDA_FUNCTION_VERSION,
                ctx.env_config.version.as_str(),
            ),
        );
        metadata.insert(
            "functionMemorySize",
            resolve(
                env,
                AWS_LAMBDA_FUNCTION_MEMORY_SIZE,
                ctx.env_config.memory.to_string(),
            ),
        );
        metadata.insert("correlationId", ctx.request_id.as_str());
        metadata.insert(
            "timestampRequest",
            request.request_time_epoch().to_string(),
        );
        metadata.insert("resource", optional(request.path()));
        metadata.insert_opt("viewerCountry", request.header(CLOUDFRONT_VIEWER_COUNTRY));
        metadata
    }

    /// Builds the required layer: channel defaults plus generated values.
    pub fn required_metadata(generated: &Generated) -> Metadata {
        Metadata::new()
            .with("level", "INFO")
            .with("error", false)
            .with("httpStatusCode", 200)
            .with("id", generated.id())
            .with("timestamp", generated.timestamp())
            .with("timestampEpoch", generated.timestamp_epoch())
    }

    /// Builds all three layers without merging them.
    pub fn layers<R: GatewayRequest>(
        &self,
        request: &R,
        invocation: &Invocation<'_>,
    ) -> MetadataLayers {
        MetadataLayers {
            static_metadata: self.static_metadata.clone(),
            dynamic: Self::dynamic_metadata(request, invocation),
            required: Self::required_metadata(invocation.generated()),
        }
    }

    /// Assembles the merged persistent attributes for one invocation.
    pub fn assemble<R: GatewayRequest>(&self, request: &R, invocation: &Invocation<'_>) -> Metadata {
        let merged = self.merge_order.merge(&self.layers(request, invocation));
        tracing::debug!(
            keys = merged.len(),
            merge_order = %self.merge_order,
            "Assembled log metadata"
        );
        merged
    }

    /// Builds a logger with `attributes` as persistent attributes and emits
    /// the informational entry.
    pub fn emit<P: LoggerProvider>(&self, provider: &P, attributes: Metadata) -> Result<P::Logger> {
        let logger = provider.logger(&self.service_name, attributes);
        logger.info(&self.message)?;
        Ok(logger)
    }
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

/// Target of the events carrying log channel entries.
pub const LOG_ENTRY_TARGET: &str = "lambda_telemetry_metadata::entry";

/// [`LoggerProvider`] emitting entries as `tracing` events.
///
/// Each event has target [`LOG_ENTRY_TARGET`] and carries the service name
/// and the persistent attributes as fields; [`log_entry_layer`] renders it
/// as one JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLoggerProvider;

impl LoggerProvider for TracingLoggerProvider {
    type Logger = TracingLogger;

    fn logger(&self, service_name: &str, persistent_attributes: Metadata) -> TracingLogger {
        TracingLogger {
            service_name: service_name.to_string(),
            attributes: persistent_attributes,
        }
    }
}

/// Logger produced by [`TracingLoggerProvider`].
#[derive(Debug, Clone)]
pub struct TracingLogger {
    service_name: String,
    attributes: Metadata,
}

impl TracingLogger {
    /// Persistent attributes attached to every entry.
    pub fn attributes(&self) -> &Metadata {
        &self.attributes
    }
}

impl Logger for TracingLogger {
    fn info(&self, message: &str) -> Result<()> {
        let attributes = serde_json::to_string(&self.attributes)?;
        tracing::info!(
            target: LOG_ENTRY_TARGET,
            service = %self.service_name,
            attributes = %attributes,
            "{message}"
        );
        Ok(())
    }
}

/// A fmt layer writing log channel entries to `make_writer`, one JSON
/// document per line. Events with other targets are ignored.
pub fn log_entry_layer<S, W>(make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .event_format(LogEntryFormat)
        .with_writer(make_writer)
        .with_filter(filter_fn(|metadata: &tracing::Metadata<'_>| {
            metadata.target() == LOG_ENTRY_TARGET
        }))
}

/// Renders an entry as `level`, `message`, `service`, `timestamp`, then the
/// persistent attributes as top-level keys.
///
/// Persistent attributes never replace `message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEntryFormat;

impl<S, N> FormatEvent<S, N> for LogEntryFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let entry = visitor.into_entry(event.metadata().level().as_str());
        let line = serde_json::to_string(&entry).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    service: Option<String>,
    attributes: Option<String>,
    fields: Map<String, Value>,
}

impl EntryVisitor {
    fn into_entry(self, level: &str) -> Value {
        let mut entry = Map::new();
        entry.insert("level".into(), level.into());
        entry.insert("message".into(), self.message.into());
        if let Some(service) = self.service {
            entry.insert("service".into(), service.into());
        }
        entry.insert(
            "timestamp".into(),
            Utc::now()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .into(),
        );
        entry.extend(self.fields);

        if let Some(raw) = self.attributes {
            match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(attributes) => {
                    for (key, value) in attributes {
                        if key != "message" {
                            entry.insert(key, value);
                        }
                    }
                }
                Err(_) => {
                    entry.insert("attributes".into(), raw.into());
                }
            }
        }
        Value::Object(entry)
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "service" => self.service = Some(value.to_string()),
            "attributes" => self.attributes = Some(value.to_string()),
            name => {
                self.fields.insert(name.to_string(), value.into());
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), value.into());
    }
}
