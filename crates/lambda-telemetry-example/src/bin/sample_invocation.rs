//! Invokes all three channel handlers once with the bundled sample event
//! and context, without a Lambda runtime.
//!
//! Log entries and metric documents go to standard output; the merged
//! metadata each handler returns is printed after it.

use anyhow::{Context, Result};
use lambda_telemetry_example::{
    fixtures, init_telemetry, log_handler, metric_handler, trace_handler,
};
use lambda_telemetry_metadata::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load metadata configuration")?;
    let _guard =
        init_telemetry(&config.trace.service_name).context("failed to initialise telemetry")?;

    let event = fixtures::sample_invocation().context("failed to parse sample event")?;
    let response = log_handler(event, &config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("log handler failed")?;
    println!("{}", response.body);

    let event = fixtures::sample_invocation().context("failed to parse sample event")?;
    let response = metric_handler(event, &config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("metric handler failed")?;
    println!("{}", response.body);

    let event = fixtures::sample_invocation().context("failed to parse sample event")?;
    let response = trace_handler(event, &config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("trace handler failed")?;
    println!("{}", response.body);

    Ok(())
}
