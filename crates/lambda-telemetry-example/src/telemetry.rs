//! Tracing subscriber and OpenTelemetry tracer provider lifecycle.
//!
//! The [`TelemetryGuard`] owns the tracer provider. When dropped, it flushes
//! pending spans and shuts the provider down so they are exported before the
//! execution environment freezes.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};
use std::time::Duration;
use lambda_telemetry_metadata::{LOG_ENTRY_TARGET, log_entry_layer};
use thiserror::Error;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Standard OTLP endpoint variable. Spans are only exported when it is set.
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

const DEFAULT_FILTER: &str = "info,lambda_telemetry_metadata=debug";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while installing telemetry.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum InitError {
    /// The OTLP span exporter could not be built.
    #[error("failed to build OTLP span exporter")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Guard that flushes and shuts down the tracer provider on drop.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Returns the tracer provider if one is configured.
    pub fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        self.tracer_provider.as_ref()
    }

    /// Flushes pending spans.
    ///
    /// Flush errors are logged with target `otel_lifecycle`.
    pub fn flush(&self) {
        if let Some(provider) = &self.tracer_provider
            && let Err(e) = provider.force_flush()
        {
            tracing::warn!(target: "otel_lifecycle", error = %e, "Failed to flush tracer provider");
        }
    }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("exporting", &self.tracer_provider.is_some())
            .finish()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.force_flush();
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down tracer provider: {e}");
            }
        }
    }
}

/// Installs the tracing subscriber and, when an OTLP endpoint is set, a
/// global tracer provider exporting over HTTP.
///
/// Log channel entries are written to standard output as JSON documents;
/// all other events go through the plain formatter. The filter comes from
/// `RUST_LOG`, defaulting to `info,lambda_telemetry_metadata=debug`.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a subscriber is
/// already installed.
pub fn init_telemetry(service_name: &str) -> Result<TelemetryGuard, InitError> {
    let tracer_provider = match std::env::var(OTLP_ENDPOINT_ENV) {
        Ok(endpoint) if !endpoint.is_empty() => {
            Some(build_tracer_provider(&endpoint, service_name)?)
        }
        _ => None,
    };

    if let Some(provider) = &tracer_provider {
        opentelemetry::global::set_tracer_provider(provider.clone());
    }

    init_subscriber(tracer_provider.as_ref())?;

    Ok(TelemetryGuard { tracer_provider })
}

fn build_tracer_provider(
    endpoint: &str,
    service_name: &str,
) -> Result<SdkTracerProvider, InitError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(signal_endpoint(endpoint, "/v1/traces"))
        .with_timeout(EXPORT_TIMEOUT)
        .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
        .build()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Ok(SdkTracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .with_resource(resource)
        .build())
}

fn signal_endpoint(endpoint: &str, path: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with(path) {
        base.to_string()
    } else {
        format!("{base}{path}")
    }
}

fn init_subscriber(tracer_provider: Option<&SdkTracerProvider>) -> Result<(), InitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .without_time()
        .with_filter(filter_fn(|metadata: &tracing::Metadata<'_>| {
            metadata.target() != LOG_ENTRY_TARGET
        }));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(log_entry_layer(std::io::stdout));

    match tracer_provider {
        Some(provider) => {
            let tracer = provider.tracer("lambda-telemetry-example");
            let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            registry.with(telemetry_layer).try_init()?;
        }
        None => registry.try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_endpoint_appends_path() {
        assert_eq!(
            signal_endpoint("http://localhost:4318", "/v1/traces"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            signal_endpoint("http://localhost:4318/", "/v1/traces"),
            "http://localhost:4318/v1/traces"
        );
    }

    #[test]
    fn test_signal_endpoint_keeps_full_path() {
        assert_eq!(
            signal_endpoint("http://collector:4318/v1/traces", "/v1/traces"),
            "http://collector:4318/v1/traces"
        );
    }

    #[test]
    fn test_guard_without_provider_is_inert() {
        let guard = TelemetryGuard {
            tracer_provider: None,
        };
        guard.flush();
        assert!(guard.tracer_provider().is_none());
    }
}
