//! Lambda runtime for the log channel handler.
//!
//! Each invocation writes one JSON log entry whose persistent attributes are
//! the merged static, dynamic and required metadata.
//!
//! Environment variables:
//! - `AWS_LAMBDA_RUNTIME_API` - Required, set by Lambda
//! - `LAMBDA_METADATA_*` - Metadata configuration overrides
//! - `RUST_LOG` - Diagnostic log filter

use anyhow::{Context, Result};
use lambda_runtime::{Runtime, service_fn};
use lambda_telemetry_example::{init_telemetry, log_handler};
use lambda_telemetry_metadata::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load metadata configuration")?;
    let _guard =
        init_telemetry(&config.service.service).context("failed to initialise telemetry")?;

    let config = &config;
    Runtime::new(service_fn(move |event| async move {
        log_handler(event, config).await
    }))
    .run()
    .await
    .map_err(|e| anyhow::anyhow!(e))
    .context("log runtime failed")
}
