//! Lambda runtime for the trace channel handler.
//!
//! Spans are exported over OTLP/HTTP when `OTEL_EXPORTER_OTLP_ENDPOINT` is
//! set and flushed after every invocation.
//!
//! Environment variables:
//! - `AWS_LAMBDA_RUNTIME_API` - Required, set by Lambda
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` - OTLP collector endpoint
//! - `LAMBDA_METADATA_*` - Metadata configuration overrides
//! - `RUST_LOG` - Diagnostic log filter

use anyhow::{Context, Result};
use lambda_runtime::{Runtime, service_fn};
use lambda_telemetry_example::{init_telemetry, trace_handler};
use lambda_telemetry_metadata::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load metadata configuration")?;
    let guard =
        init_telemetry(&config.trace.service_name).context("failed to initialise telemetry")?;

    let config = &config;
    let guard = &guard;
    // Not `run()`: its per-invocation runtime span would never be flushed
    // before the execution environment freezes.
    Runtime::new(service_fn(move |event| async move {
        let response = trace_handler(event, config).await;
        guard.flush();
        response
    }))
    .run()
    .await
    .map_err(|e| anyhow::anyhow!(e))
    .context("trace runtime failed")
}
