//! Parent trace context of an invocation.
//!
//! Lambda hands each invocation an X-Ray trace header, either on the
//! invocation context or in `_X_AMZN_TRACE_ID`. Converted to a W3C
//! `traceparent`, it gives the trace channel a remote parent so the nested
//! span joins the invocation's trace.

use crate::env::{EnvSource, X_AMZN_TRACE_ID};
use crate::invocation::Invocation;
use opentelemetry::Context;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::TraceContextExt;
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Builds the remote parent context of `invocation`.
///
/// The header on the invocation context takes precedence over the
/// environment. Returns `None` when neither carries a usable header.
pub fn invocation_parent(invocation: &Invocation<'_>) -> Option<Context> {
    let header = invocation
        .context()
        .xray_trace_id
        .clone()
        .filter(|header| !header.is_empty())
        .or_else(|| {
            invocation
                .env()
                .var(X_AMZN_TRACE_ID)
                .filter(|header| !header.is_empty())
        })?;

    let traceparent = convert_xray_to_traceparent(&header)?;
    let cx = TraceContextPropagator::new().extract(&TraceparentExtractor(&traceparent));

    if cx.span().span_context().is_valid() {
        Some(cx)
    } else {
        tracing::debug!(header = %header, "Ignoring unusable X-Ray trace header");
        None
    }
}

struct TraceparentExtractor<'a>(&'a str);

impl Extractor for TraceparentExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        key.eq_ignore_ascii_case("traceparent").then_some(self.0)
    }

    fn keys(&self) -> Vec<&str> {
        vec!["traceparent"]
    }
}

/// Converts an X-Ray trace header to a W3C `traceparent`.
///
/// X-Ray: `Root=1-{epoch}-{random};Parent={span-id};Sampled=1`
/// W3C: `00-{trace-id}-{parent-id}-{flags}`
pub fn convert_xray_to_traceparent(xray: &str) -> Option<String> {
    let mut trace_id = None;
    let mut parent_id = None;
    let mut sampled = false;

    for part in xray.split(';').map(str::trim) {
        if let Some(root) = part.strip_prefix("Root=") {
            trace_id = xray_trace_id(root);
        } else if let Some(parent) = part.strip_prefix("Parent=") {
            parent_id = Some(parent);
        } else if part == "Sampled=1" {
            sampled = true;
        }
    }

    let trace_id = trace_id?;
    let parent_id = parent_id.filter(|id| id.len() == 16)?;
    let flags = if sampled { "01" } else { "00" };
    Some(format!("00-{trace_id}-{parent_id}-{flags}"))
}

/// `1-{epoch_hex}-{random_hex}` to the 32 character OpenTelemetry form.
fn xray_trace_id(root: &str) -> Option<String> {
    match root.split('-').collect::<Vec<_>>().as_slice() {
        ["1", epoch, random] => {
            let trace_id = format!("{epoch}{random}");
            (trace_id.len() == 32).then_some(trace_id)
        }
        _ => None,
    }
}
