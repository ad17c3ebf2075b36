//! Metadata assembly for AWS Lambda logs, metrics and traces.
//!
//! Every telemetry channel carries the same three kinds of metadata:
//!
//! - **Static** - organisational facts fixed at deployment time (owner,
//!   domain, service, team, ...), loaded from configuration.
//! - **Dynamic** - facts read per invocation from the API Gateway event, the
//!   Lambda invocation context and the environment.
//! - **Required** - values every entry must carry, including a fresh id and
//!   timestamps generated for each assembly.
//!
//! The three layers are merged shallowly in a configurable [`MergeOrder`];
//! later categories win on key collisions. The merged mapping is then handed
//! to the channel's client: persistent logger attributes, metric metadata, or
//! span annotations.
//!
//! # Example
//!
//! ```no_run
//! use aws_lambda_events::apigw::ApiGatewayProxyRequest;
//! use lambda_runtime::Context;
//! use lambda_telemetry_metadata::{Config, Invocation, LogChannel, TracingLoggerProvider};
//!
//! fn handle(event: &ApiGatewayProxyRequest, context: &Context) -> lambda_telemetry_metadata::Result<()> {
//!     let config = Config::load()?;
//!     let channel = LogChannel::from_config(&config);
//!
//!     let attributes = channel.assemble(event, &Invocation::new(context));
//!     channel.emit(&TracingLoggerProvider, attributes)?;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! [`Config`] is layered with figment: compiled defaults, then an optional
//! TOML file, then `LAMBDA_METADATA_*` environment variables.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod env;
mod error;
mod generated;
mod invocation;
mod log;
mod merge;
mod metadata;
mod metric;
mod propagation;
mod request;
mod static_metadata;
mod trace;

pub use config::{Config, ConfigBuilder, LogConfig, MetricsConfig, TraceConfig};
pub use error::{MetadataError, Result};
pub use generated::Generated;
pub use invocation::Invocation;
pub use log::{
    LOG_ENTRY_TARGET, LogChannel, LogEntryFormat, Logger, LoggerProvider, TracingLogger,
    TracingLoggerProvider, log_entry_layer,
};
pub use merge::{Category, MergeOrder, MetadataLayers};
pub use metadata::Metadata;
pub use metric::{
    DURATION_METRIC, EmfMetrics, MetricChannel, MetricUnit, MetricsRecorder, SERVICE_DIMENSION,
};
pub use propagation::{convert_xray_to_traceparent, invocation_parent};
pub use request::{CLOUDFRONT_VIEWER_COUNTRY, GatewayRequest};
pub use static_metadata::StaticMetadata;
pub use trace::{OtelSpan, OtelTracer, SpanIds, TraceChannel, Tracer};
