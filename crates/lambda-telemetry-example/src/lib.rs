//! Example Lambda handlers emitting logs, metrics and traces enriched with
//! merged invocation metadata.
//!
//! Each handler covers one channel:
//!
//! - [`log_handler`] - builds a logger whose persistent attributes are the
//!   merged metadata and writes one informational entry
//! - [`metric_handler`] - records a `Duration` measurement with the merged
//!   metadata attached and publishes it once
//! - [`trace_handler`] - opens a nested span and annotates it
//!
//! The `handle_*` functions hold the channel logic against injected clients
//! so they can be driven from tests and the `sample_invocation` harness.
//!
//! ## Example: log runtime
//!
//! ```ignore
//! use lambda_runtime::{Runtime, service_fn};
//! use lambda_telemetry_example::{init_telemetry, log_handler};
//! use lambda_telemetry_metadata::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     let _guard = init_telemetry("log-runtime")?;
//!     let config = Config::load()?;
//!     let config = &config;
//!     Runtime::new(service_fn(move |event| async move { log_handler(event, config).await }))
//!         .run()
//!         .await
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
mod telemetry;

use aws_lambda_events::apigw::ApiGatewayProxyRequest;
use lambda_runtime::{Context as LambdaContext, LambdaEvent};
use lambda_telemetry_metadata::{
    Config, EmfMetrics, Invocation, LogChannel, LoggerProvider, Metadata, MetricChannel,
    MetricsRecorder, OtelTracer, TraceChannel, Tracer, TracingLoggerProvider, invocation_parent,
};
use serde::Serialize;

pub use telemetry::{InitError, OTLP_ENDPOINT_ENV, TelemetryGuard, init_telemetry};

/// Response returned by every handler.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// The merged metadata the channel emitted, as a JSON string.
    pub body: String,
}

impl HandlerResponse {
    fn ok(metadata: &Metadata) -> Result<Self, lambda_runtime::Error> {
        Ok(Self {
            status_code: 200,
            body: serde_json::to_string(metadata)?,
        })
    }
}

/// Assembles the log metadata and emits one entry through `provider`.
///
/// # Errors
///
/// Returns an error if the entry cannot be written.
pub fn handle_log<P: LoggerProvider>(
    request: &ApiGatewayProxyRequest,
    invocation: &Invocation<'_>,
    config: &Config,
    provider: &P,
) -> lambda_telemetry_metadata::Result<Metadata> {
    let channel = LogChannel::from_config(config);
    let metadata = channel.assemble(request, invocation);
    channel.emit(provider, metadata.clone())?;
    Ok(metadata)
}

/// Assembles the metric metadata and publishes it through `recorder`.
///
/// # Errors
///
/// Returns an error if the metric document cannot be written.
pub fn handle_metric<M: MetricsRecorder + ?Sized>(
    invocation: &Invocation<'_>,
    config: &Config,
    recorder: &mut M,
) -> lambda_telemetry_metadata::Result<Metadata> {
    let channel = MetricChannel::from_config(config);
    let metadata = channel.assemble(invocation);
    channel.emit(recorder, metadata.clone())?;
    Ok(metadata)
}

/// Runs the traced unit of work under a nested span on `tracer`.
pub fn handle_trace<T: Tracer>(
    request: &ApiGatewayProxyRequest,
    config: &Config,
    tracer: &mut T,
) -> Metadata {
    TraceChannel::from_config(config).trace(tracer, request, || {
        tracing::debug!("Calling the user service");
    })
}

/// Log channel handler emitting the entry as a `tracing` event.
///
/// With the subscriber from [`init_telemetry`] installed, the entry is
/// written to standard output as one JSON document.
///
/// # Errors
///
/// Returns an error if the entry cannot be written.
pub async fn log_handler(
    event: LambdaEvent<ApiGatewayProxyRequest>,
    config: &Config,
) -> Result<HandlerResponse, lambda_runtime::Error> {
    let (request, context) = event.into_parts();
    let metadata = handle_log(
        &request,
        &Invocation::new(&context),
        config,
        &TracingLoggerProvider,
    )?;
    HandlerResponse::ok(&metadata)
}

/// Metric channel handler writing an Embedded Metric Format document to
/// standard output.
///
/// Only the invocation context is read; the event payload is ignored.
///
/// # Errors
///
/// Returns an error if the metrics collector cannot be installed or the
/// metric document cannot be written.
pub async fn metric_handler<E>(
    event: LambdaEvent<E>,
    config: &Config,
) -> Result<HandlerResponse, lambda_runtime::Error> {
    let context: LambdaContext = event.context;
    let mut metrics = EmfMetrics::from_config(config)?;
    let metadata = handle_metric(&Invocation::new(&context), config, &mut metrics)?;
    HandlerResponse::ok(&metadata)
}

/// Trace channel handler using the global OpenTelemetry tracer provider.
///
/// The nested span is opened under the invocation's X-Ray trace when the
/// invocation carries one.
///
/// # Errors
///
/// Returns an error if the response cannot be serialised.
pub async fn trace_handler(
    event: LambdaEvent<ApiGatewayProxyRequest>,
    config: &Config,
) -> Result<HandlerResponse, lambda_runtime::Error> {
    let (request, context) = event.into_parts();
    let invocation = Invocation::new(&context);
    let metadata = {
        let mut tracer = OtelTracer::global(config.trace.service_name.clone());
        if let Some(parent) = invocation_parent(&invocation) {
            tracer = tracer.with_parent(parent);
        }
        handle_trace(&request, config, &mut tracer)
    };
    HandlerResponse::ok(&metadata)
}
