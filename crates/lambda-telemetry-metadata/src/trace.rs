//! Trace channel: a nested span annotated with invocation metadata.
//!
//! The channel opens a child span under the currently active span, makes it
//! active for the duration of the traced work, attaches each metadata entry
//! to it, closes it and makes the parent active again.

use crate::config::{Config, TraceConfig};
use crate::generated::Generated;
use crate::metadata::Metadata;
use crate::request::GatewayRequest;
use opentelemetry::trace::{SpanContext, TraceContextExt, Tracer as _};
use opentelemetry::{Context, ContextGuard, KeyValue, global};
use serde_json::Value;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identifiers of a recorded span, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanIds {
    /// Span identifier.
    pub span_id: String,
    /// Trace identifier.
    pub trace_id: String,
}

impl SpanIds {
    /// Random identifiers for spans the tracer does not record.
    pub fn random() -> Self {
        Self {
            span_id: Uuid::new_v4().to_string(),
            trace_id: Uuid::new_v4().to_string(),
        }
    }
}

/// A tracing client with an explicit notion of the active span.
pub trait Tracer {
    /// Handle to an open or closed span.
    type Span;

    /// The currently active span.
    fn current_span(&mut self) -> Self::Span;

    /// Opens a span named `name` under `parent`. The new span is not active.
    fn child_span(&mut self, parent: &Self::Span, name: &str) -> Self::Span;

    /// Makes `span` the active span.
    fn set_active(&mut self, span: &Self::Span);

    /// Attaches a metadata entry to the active span.
    fn put_metadata(&mut self, key: &str, value: &Value);

    /// Closes `span`.
    fn close(&mut self, span: &Self::Span);

    /// Identifiers of `span`, when the tracer records it.
    fn span_ids(&self, span: &Self::Span) -> Option<SpanIds>;
}

/// Assembles the trace channel's metadata and drives the nested span.
#[derive(Debug, Clone)]
pub struct TraceChannel {
    service_name: String,
    span_name: String,
}

impl Default for TraceChannel {
    fn default() -> Self {
        let defaults = TraceConfig::default();
        Self {
            service_name: defaults.service_name,
            span_name: defaults.span_name,
        }
    }
}

impl TraceChannel {
    /// Creates a channel with the default service and span names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .service_name(config.trace.service_name.clone())
            .span_name(config.trace.span_name.clone())
    }

    /// Sets the service name recorded on the span.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Sets the nested span name.
    #[must_use]
    pub fn span_name(mut self, name: impl Into<String>) -> Self {
        self.span_name = name.into();
        self
    }

    /// Builds the flat mapping attached to the span.
    ///
    /// `correlationId` is the API Gateway request id from the event, not the
    /// Lambda request id.
    pub fn dynamic_metadata<R: GatewayRequest>(
        &self,
        request: &R,
        generated: &Generated,
        ids: SpanIds,
        elapsed: Duration,
    ) -> Metadata {
        let mut metadata = Metadata::new()
            .with("name", self.span_name.as_str())
            .with("timestamp", generated.timestamp())
            .with("timestampEpoch", generated.timestamp_epoch())
            .with("durationMs", elapsed.as_millis() as u64)
            .with("spanName", self.span_name.as_str())
            .with("spanId", ids.span_id)
            .with("traceId", ids.trace_id)
            .with("attributes", Value::Object(Default::default()));
        metadata.insert(
            "correlationId",
            request.request_id().map_or(Value::Null, Value::from),
        );
        metadata.insert("service", self.service_name.as_str());
        metadata
    }

    /// Runs `work` inside a nested span and annotates the span afterwards.
    ///
    /// The span is closed and its parent active again when this returns.
    /// Returns the metadata attached to the span.
    pub fn trace<T, R, F>(&self, tracer: &mut T, request: &R, work: F) -> Metadata
    where
        T: Tracer,
        R: GatewayRequest,
        F: FnOnce(),
    {
        let started = Instant::now();
        let parent = tracer.current_span();
        let span = tracer.child_span(&parent, &self.span_name);
        tracer.set_active(&span);

        work();
        let elapsed = started.elapsed();

        let ids = tracer.span_ids(&span).unwrap_or_else(SpanIds::random);
        let metadata = self.dynamic_metadata(request, &Generated::now(), ids, elapsed);
        for (key, value) in &metadata {
            tracer.put_metadata(key, value);
        }

        tracer.close(&span);
        tracer.set_active(&parent);
        tracing::debug!(
            span_name = %self.span_name,
            keys = metadata.len(),
            "Closed annotated span"
        );
        metadata
    }
}

/// A span handle for [`OtelTracer`]: the context carrying the span.
#[derive(Debug, Clone)]
pub struct OtelSpan {
    cx: Context,
    /// Attachments held by the tracer while this span was current.
    depth: Option<usize>,
}

impl OtelSpan {
    /// The context with this span as its active span.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// The span's context.
    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }
}

/// [`Tracer`] on the OpenTelemetry API.
///
/// Making a new span active attaches its context to the current thread.
/// Making a span returned by [`Tracer::current_span`] active again releases
/// every attachment made after it, last-in first-out; dropping the tracer
/// releases the rest. Spans are tracked by position, not by id, so a child
/// sharing its parent's span context still restores correctly. The guards
/// are thread-bound, so the tracer must not be held across an `.await`.
pub struct OtelTracer<T = global::BoxedTracer> {
    tracer: T,
    active: Vec<ContextGuard>,
}

impl OtelTracer {
    /// Uses a tracer from the global provider.
    pub fn global(service_name: impl Into<std::borrow::Cow<'static, str>>) -> Self {
        Self::with_tracer(global::tracer(service_name))
    }
}

impl<T> OtelTracer<T> {
    /// Uses `tracer` to open spans.
    pub fn with_tracer(tracer: T) -> Self {
        Self {
            tracer,
            active: Vec::new(),
        }
    }

    /// Attaches `parent` for the lifetime of the tracer, so spans opened
    /// under the current span join its trace.
    #[must_use]
    pub fn with_parent(mut self, parent: Context) -> Self {
        self.active.push(parent.attach());
        self
    }

    fn release_above(&mut self, len: usize) {
        while self.active.len() > len {
            self.active.pop();
        }
    }
}

impl<T> std::fmt::Debug for OtelTracer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelTracer")
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for OtelTracer<T> {
    fn drop(&mut self) {
        self.release_above(0);
    }
}

impl<T> Tracer for OtelTracer<T>
where
    T: opentelemetry::trace::Tracer,
    T::Span: Send + Sync + 'static,
{
    type Span = OtelSpan;

    fn current_span(&mut self) -> OtelSpan {
        OtelSpan {
            cx: Context::current(),
            depth: Some(self.active.len()),
        }
    }

    fn child_span(&mut self, parent: &OtelSpan, name: &str) -> OtelSpan {
        let span = self.tracer.start_with_context(name.to_string(), &parent.cx);
        OtelSpan {
            cx: parent.cx.with_span(span),
            depth: None,
        }
    }

    fn set_active(&mut self, span: &OtelSpan) {
        match span.depth {
            Some(depth) if depth <= self.active.len() => self.release_above(depth),
            _ => self.active.push(span.cx.clone().attach()),
        }
    }

    fn put_metadata(&mut self, key: &str, value: &Value) {
        Context::current()
            .span()
            .set_attribute(to_key_value(key, value));
    }

    fn close(&mut self, span: &OtelSpan) {
        span.cx.span().end();
    }

    fn span_ids(&self, span: &OtelSpan) -> Option<SpanIds> {
        let span_context = span.span_context();
        span_context.is_valid().then(|| SpanIds {
            span_id: span_context.span_id().to_string(),
            trace_id: span_context.trace_id().to_string(),
        })
    }
}

/// Converts a metadata entry to a span attribute.
///
/// Objects and arrays are stored as their JSON text.
fn to_key_value(key: &str, value: &Value) -> KeyValue {
    let key = key.to_string();
    match value {
        Value::Bool(b) => KeyValue::new(key, *b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => KeyValue::new(key, i),
            None => KeyValue::new(key, n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => KeyValue::new(key, s.clone()),
        Value::Null => KeyValue::new(key, "null"),
        Value::Array(_) | Value::Object(_) => KeyValue::new(key, value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_lambda_events::apigw::ApiGatewayProxyRequest;
    use crate::invocation::Invocation;
    use crate::propagation::invocation_parent;
    use lambda_runtime::Context as LambdaContext;
    use opentelemetry::Value as OtelValue;
    use opentelemetry::trace::noop::NoopTracer;
    use opentelemetry::trace::{Tracer as _, TracerProvider as _};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    use serde_json::json;
    use std::collections::HashMap;

    const XRAY_HEADER: &str =
        "Root=1-5e66d96f-7f2c4c3bb7a1e5f2a1d3c4e5;Parent=53995c3f42cd8ad8;Sampled=1";

    fn create_test_provider() -> (InMemorySpanExporter, SdkTracerProvider) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (exporter, provider)
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Child(usize, String),
        SetActive(usize),
        Put(String),
        Close(usize),
    }

    /// Records every call; span handles are indices, 0 being the root.
    #[derive(Default)]
    struct RecordingTracer {
        active: usize,
        next: usize,
        closed: Vec<usize>,
        calls: Vec<Call>,
        metadata: Vec<(usize, String, Value)>,
    }

    impl Tracer for RecordingTracer {
        type Span = usize;

        fn current_span(&mut self) -> usize {
            self.active
        }

        fn child_span(&mut self, parent: &usize, name: &str) -> usize {
            self.next += 1;
            self.calls.push(Call::Child(*parent, name.to_string()));
            self.next
        }

        fn set_active(&mut self, span: &usize) {
            self.calls.push(Call::SetActive(*span));
            self.active = *span;
        }

        fn put_metadata(&mut self, key: &str, value: &Value) {
            self.calls.push(Call::Put(key.to_string()));
            self.metadata.push((self.active, key.to_string(), value.clone()));
        }

        fn close(&mut self, span: &usize) {
            self.calls.push(Call::Close(*span));
            self.closed.push(*span);
        }

        fn span_ids(&self, _span: &usize) -> Option<SpanIds> {
            None
        }
    }

    fn create_test_event() -> ApiGatewayProxyRequest {
        let mut event = ApiGatewayProxyRequest::default();
        event.request_context.request_id =
            Some("77375676-xmpl-4b79-853a-f982474efe18".to_string());
        event
    }

    #[test]
    fn test_dynamic_metadata_keys() {
        let channel = TraceChannel::new();
        let ids = SpanIds {
            span_id: "s".to_string(),
            trace_id: "t".to_string(),
        };

        let metadata = channel.dynamic_metadata(
            &create_test_event(),
            &Generated::now(),
            ids,
            Duration::from_millis(7),
        );

        let keys: Vec<&str> = metadata.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "name",
                "timestamp",
                "timestampEpoch",
                "durationMs",
                "spanName",
                "spanId",
                "traceId",
                "attributes",
                "correlationId",
                "service",
            ]
        );
        assert_eq!(
            metadata.get_str("name"),
            Some("Call the User service and fetch a response")
        );
        assert_eq!(metadata.get("durationMs"), Some(&json!(7)));
        assert_eq!(metadata.get("attributes"), Some(&json!({})));
        assert_eq!(
            metadata.get_str("correlationId"),
            Some("77375676-xmpl-4b79-853a-f982474efe18")
        );
        assert_eq!(metadata.get_str("service"), Some("MyService"));
    }

    #[test]
    fn test_trace_restores_parent() {
        let mut tracer = RecordingTracer::default();
        let channel = TraceChannel::new().span_name("fetch user");
        let mut worked = false;

        let metadata = channel.trace(&mut tracer, &create_test_event(), || worked = true);

        assert!(worked);
        assert_eq!(tracer.active, 0);
        assert_eq!(tracer.closed, vec![1]);
        assert_eq!(tracer.calls.first(), Some(&Call::Child(0, "fetch user".into())));
        assert_eq!(tracer.calls[1], Call::SetActive(1));

        let close = tracer
            .calls
            .iter()
            .position(|c| *c == Call::Close(1))
            .unwrap();
        assert_eq!(tracer.calls[close + 1], Call::SetActive(0));
        assert!(tracer.calls[2..close]
            .iter()
            .all(|c| matches!(c, Call::Put(_))));

        assert_eq!(tracer.metadata.len(), metadata.len());
        assert!(tracer.metadata.iter().all(|(span, _, _)| *span == 1));
    }

    /// Takes a fixed time to open each span.
    #[derive(Default)]
    struct SlowStartTracer(RecordingTracer);

    impl Tracer for SlowStartTracer {
        type Span = usize;

        fn current_span(&mut self) -> usize {
            self.0.current_span()
        }

        fn child_span(&mut self, parent: &usize, name: &str) -> usize {
            std::thread::sleep(Duration::from_millis(20));
            self.0.child_span(parent, name)
        }

        fn set_active(&mut self, span: &usize) {
            self.0.set_active(span);
        }

        fn put_metadata(&mut self, key: &str, value: &Value) {
            self.0.put_metadata(key, value);
        }

        fn close(&mut self, span: &usize) {
            self.0.close(span);
        }

        fn span_ids(&self, span: &usize) -> Option<SpanIds> {
            self.0.span_ids(span)
        }
    }

    #[test]
    fn test_duration_includes_span_start() {
        let mut tracer = SlowStartTracer::default();
        let channel = TraceChannel::new();

        let metadata = channel.trace(&mut tracer, &create_test_event(), || {});

        let duration = metadata.get("durationMs").and_then(Value::as_u64).unwrap();
        assert!(duration >= 20, "durationMs was {duration}");
    }

    #[test]
    fn test_untracked_span_gets_random_ids() {
        let mut tracer = RecordingTracer::default();
        let metadata = TraceChannel::new().trace(&mut tracer, &create_test_event(), || {});

        let span_id = metadata.get_str("spanId").unwrap();
        let trace_id = metadata.get_str("traceId").unwrap();
        assert!(Uuid::parse_str(span_id).is_ok());
        assert_ne!(span_id, trace_id);
    }

    #[test]
    fn test_to_key_value() {
        assert_eq!(to_key_value("a", &json!(true)).value, OtelValue::Bool(true));
        assert_eq!(to_key_value("a", &json!(200)).value, OtelValue::I64(200));
        assert_eq!(to_key_value("a", &json!(1.5)).value, OtelValue::F64(1.5));
        assert_eq!(
            to_key_value("a", &json!({})).value,
            OtelValue::from("{}".to_string())
        );
        assert_eq!(
            to_key_value("a", &Value::Null).value,
            OtelValue::from("null")
        );
    }

    #[test]
    fn test_otel_tracer_records_nested_span() {
        let (exporter, provider) = create_test_provider();
        let sdk_tracer = provider.tracer("lambda-telemetry-metadata-test");

        let root = sdk_tracer.start("root");
        let root_cx = Context::current_with_span(root);
        let root_span_id = root_cx.span().span_context().span_id();
        let _root_guard = root_cx.clone().attach();

        let mut tracer = OtelTracer::with_tracer(sdk_tracer);
        let metadata = TraceChannel::new().trace(&mut tracer, &create_test_event(), || {
            assert_ne!(
                Context::current().span().span_context().span_id(),
                root_span_id
            );
        });

        assert_eq!(
            Context::current().span().span_context().span_id(),
            root_span_id
        );
        drop(tracer);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "Call the User service and fetch a response");
        assert_eq!(span.parent_span_id, root_span_id);
        assert_eq!(
            metadata.get_str("spanId"),
            Some(span.span_context.span_id().to_string().as_str())
        );
        let correlation = span
            .attributes
            .iter()
            .find(|kv| kv.key.as_str() == "correlationId")
            .unwrap();
        assert_eq!(
            correlation.value.as_str(),
            "77375676-xmpl-4b79-853a-f982474efe18"
        );
        assert_eq!(span.attributes.len(), metadata.len());
    }

    #[test]
    fn test_parent_restored_when_child_shares_its_context() {
        let (exporter, provider) = create_test_provider();
        let root_cx = Context::current_with_span(provider.tracer("test").start("root"));
        let _root_guard = root_cx.clone().attach();

        let mut tracer = OtelTracer::with_tracer(NoopTracer::new());
        TraceChannel::new().trace(&mut tracer, &create_test_event(), || {});

        assert_eq!(format!("{tracer:?}"), "OtelTracer { active: 0, .. }");
        Context::current()
            .span()
            .set_attribute(KeyValue::new("after", true));
        root_cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let root = &spans[0];
        assert_eq!(root.name, "root");
        assert!(root.attributes.iter().any(|kv| kv.key.as_str() == "after"));
        assert!(
            !root
                .attributes
                .iter()
                .any(|kv| kv.key.as_str() == "correlationId")
        );
    }

    #[test]
    fn test_span_joins_invocation_trace() {
        let (exporter, provider) = create_test_provider();
        let mut ctx = LambdaContext::default();
        ctx.xray_trace_id = Some(XRAY_HEADER.to_string());
        let env: HashMap<&str, &str> = HashMap::new();
        let invocation = Invocation::new(&ctx).with_env(&env);

        let parent = invocation_parent(&invocation).unwrap();
        let mut tracer = OtelTracer::with_tracer(provider.tracer("test")).with_parent(parent);
        let metadata = TraceChannel::new().trace(&mut tracer, &create_test_event(), || {});

        assert_eq!(
            Context::current().span().span_context().span_id().to_string(),
            "53995c3f42cd8ad8"
        );
        drop(tracer);
        assert!(!Context::current().span().span_context().is_valid());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.parent_span_id.to_string(), "53995c3f42cd8ad8");
        assert_eq!(
            span.span_context.trace_id().to_string(),
            "5e66d96f7f2c4c3bb7a1e5f2a1d3c4e5"
        );
        assert_eq!(
            metadata.get_str("traceId"),
            Some("5e66d96f7f2c4c3bb7a1e5f2a1d3c4e5")
        );
    }
}
