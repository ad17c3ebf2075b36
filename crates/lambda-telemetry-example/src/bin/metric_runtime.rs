//! Lambda runtime for the metric channel handler.
//!
//! Each invocation writes one CloudWatch Embedded Metric Format document to
//! standard output. The event payload is ignored.
//!
//! Environment variables:
//! - `AWS_LAMBDA_RUNTIME_API` - Required, set by Lambda
//! - `LAMBDA_METADATA_*` - Metadata configuration overrides
//! - `RUST_LOG` - Diagnostic log filter

use anyhow::{Context, Result};
use lambda_runtime::{LambdaEvent, Runtime, service_fn};
use lambda_telemetry_example::{init_telemetry, metric_handler};
use lambda_telemetry_metadata::Config;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load metadata configuration")?;
    let _guard =
        init_telemetry(&config.service.service).context("failed to initialise telemetry")?;

    let config = &config;
    Runtime::new(service_fn(move |event: LambdaEvent<Value>| async move {
        metric_handler(event, config).await
    }))
    .run()
    .await
    .map_err(|e| anyhow::anyhow!(e))
    .context("metric runtime failed")
}
