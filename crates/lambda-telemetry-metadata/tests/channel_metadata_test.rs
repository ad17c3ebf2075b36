//! Integration tests for metadata assembly across the three channels.
//!
//! These tests drive each channel with a REST API sample event and an
//! invocation context, using capturing clients in place of real log, metric
//! and trace backends.

use aws_lambda_events::apigw::ApiGatewayProxyRequest;
use lambda_runtime::{Config as LambdaConfig, Context as LambdaContext};
use lambda_telemetry_metadata::env::{AWS_REGION, UNKNOWN, resolve};
use lambda_telemetry_metadata::{
    Category, Config, Invocation, LogChannel, Logger, LoggerProvider, Metadata, MergeOrder,
    MetricChannel, MetricUnit, MetricsRecorder, SpanIds, StaticMetadata, TraceChannel, Tracer,
};
use serde_json::Value;
use serial_test::serial;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// API Gateway REST API sample event, trimmed to the fields read here.
const API_GATEWAY_REST_EVENT: &str = r#"{
  "resource": "/",
  "path": "/",
  "httpMethod": "GET",
  "headers": {
    "CloudFront-Viewer-Country": "SE",
    "X-Forwarded-For": "192.168.0.1"
  },
  "multiValueHeaders": {},
  "queryStringParameters": null,
  "pathParameters": null,
  "stageVariables": null,
  "requestContext": {
    "resourceId": "2gxmpl",
    "resourcePath": "/",
    "httpMethod": "GET",
    "requestTime": "10/Mar/2020:00:03:59 +0000",
    "path": "/prod/",
    "accountId": "123456789012",
    "protocol": "HTTP/1.1",
    "stage": "prod",
    "requestTimeEpoch": 1583798639428,
    "requestId": "77375676-xmpl-4b79-853a-f982474efe18",
    "identity": {
      "sourceIp": "192.168.0.1",
      "user": null
    },
    "apiId": "70ixmpl4fl"
  },
  "body": null,
  "isBase64Encoded": false
}"#;

fn create_test_event() -> ApiGatewayProxyRequest {
    serde_json::from_str(API_GATEWAY_REST_EVENT).unwrap()
}

fn create_test_context() -> LambdaContext {
    let mut config = LambdaConfig::default();
    config.function_name = "somestack-FunctionName".to_string();
    config.version = "$LATEST".to_string();
    config.memory = 1024;
    config.log_group = "/aws/lambda/somestack-FunctionName".to_string();
    config.log_stream = "2022/07/09/[$LATEST]159282acddb84ca0bc0d5f325ea01343".to_string();

    let mut ctx = LambdaContext::default();
    ctx.request_id = "6c933bd2-9535-45a8-b09c-84d00b4f50cc".to_string();
    ctx.env_config = Arc::new(config);
    ctx
}

#[derive(Clone, Default)]
struct CapturingLoggerProvider {
    entries: Rc<RefCell<Vec<(String, String, Metadata)>>>,
}

struct CapturingLogger {
    service_name: String,
    attributes: Metadata,
    entries: Rc<RefCell<Vec<(String, String, Metadata)>>>,
}

impl LoggerProvider for CapturingLoggerProvider {
    type Logger = CapturingLogger;

    fn logger(&self, service_name: &str, persistent_attributes: Metadata) -> CapturingLogger {
        CapturingLogger {
            service_name: service_name.to_string(),
            attributes: persistent_attributes,
            entries: Rc::clone(&self.entries),
        }
    }
}

impl Logger for CapturingLogger {
    fn info(&self, message: &str) -> lambda_telemetry_metadata::Result<()> {
        self.entries.borrow_mut().push((
            self.service_name.clone(),
            message.to_string(),
            self.attributes.clone(),
        ));
        Ok(())
    }
}

#[derive(Default)]
struct CapturingRecorder {
    metrics: Vec<(String, MetricUnit, f64)>,
    dimensions: Vec<(String, String)>,
    metadata: Metadata,
    flushes: usize,
}

impl MetricsRecorder for CapturingRecorder {
    fn add_metric(&mut self, name: &str, unit: MetricUnit, value: f64) {
        self.metrics.push((name.to_string(), unit, value));
    }

    fn add_dimension(&mut self, name: &str, value: &str) {
        self.dimensions.push((name.to_string(), value.to_string()));
    }

    fn add_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key, value);
    }

    fn flush(&mut self) -> lambda_telemetry_metadata::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Spans are numbered from 1; 0 is the ambient root span.
#[derive(Default)]
struct CapturingTracer {
    active: u32,
    next: u32,
    open: Vec<u32>,
    annotations: HashMap<u32, Metadata>,
    active_during_close: Option<u32>,
}

impl Tracer for CapturingTracer {
    type Span = u32;

    fn current_span(&mut self) -> u32 {
        self.active
    }

    fn child_span(&mut self, _parent: &u32, _name: &str) -> u32 {
        self.next += 1;
        self.open.push(self.next);
        self.next
    }

    fn set_active(&mut self, span: &u32) {
        self.active = *span;
    }

    fn put_metadata(&mut self, key: &str, value: &Value) {
        self.annotations
            .entry(self.active)
            .or_default()
            .insert(key, value.clone());
    }

    fn close(&mut self, span: &u32) {
        self.active_during_close = Some(self.active);
        self.open.retain(|s| s != span);
    }

    fn span_ids(&self, span: &u32) -> Option<SpanIds> {
        Some(SpanIds {
            span_id: format!("{span:016x}"),
            trace_id: format!("{:032x}", 1),
        })
    }
}

#[test]
fn test_sample_event_log_metadata_without_region() {
    let event = create_test_event();
    let ctx = create_test_context();
    let env: HashMap<&str, &str> = HashMap::new();
    let invocation = Invocation::new(&ctx).with_env(&env);

    let metadata = LogChannel::new(&StaticMetadata::default()).assemble(&event, &invocation);

    assert_eq!(metadata.get_str("accountId"), Some("123456789012"));
    assert_eq!(metadata.get_str("stage"), Some("prod"));
    assert_eq!(metadata.get_str("region"), Some(UNKNOWN));
    assert_eq!(metadata.get_str("viewerCountry"), Some("SE"));
    assert_eq!(metadata.get("user"), Some(&Value::Null));
}

#[test]
fn test_static_only_keys_survive_merge() {
    let event = create_test_event();
    let ctx = create_test_context();
    let env: HashMap<&str, &str> = HashMap::new();
    let invocation = Invocation::new(&ctx).with_env(&env);
    let service = StaticMetadata::default();

    for order in [
        MergeOrder::DYNAMIC_STATIC_REQUIRED,
        MergeOrder::STATIC_DYNAMIC_REQUIRED,
    ] {
        let metadata = LogChannel::new(&service)
            .merge_order(order)
            .assemble(&event, &invocation);

        for (key, value) in &service.to_metadata() {
            assert_eq!(metadata.get(key), Some(value), "key {key} under {order}");
        }
    }
}

#[test]
fn test_collision_resolved_by_configured_order() {
    let event = create_test_event();
    let ctx = create_test_context();
    let invocation = Invocation::new(&ctx);
    let channel = LogChannel::new(&StaticMetadata::default());

    let mut layers = channel.layers(&event, &invocation);
    layers.static_metadata.insert("level", "DEBUG");

    let default_order = MergeOrder::default().merge(&layers);
    assert_eq!(default_order.get_str("level"), Some("INFO"));

    let static_last: MergeOrder = "dynamic,required,static".parse().unwrap();
    let merged = static_last.merge(&layers);
    assert_eq!(merged.get_str("level"), Some("DEBUG"));
    assert_eq!(
        static_last.winner(Category::Static, Category::Required),
        Category::Static
    );
}

#[test]
#[serial]
fn test_env_resolution_against_process() {
    temp_env::with_var(AWS_REGION, None::<&str>, || {
        assert_eq!(
            lambda_telemetry_metadata::env::resolve_env(AWS_REGION, UNKNOWN),
            UNKNOWN
        );
    });
    temp_env::with_var(AWS_REGION, Some("eu-north-1"), || {
        assert_eq!(
            lambda_telemetry_metadata::env::resolve_env(AWS_REGION, UNKNOWN),
            "eu-north-1"
        );

        let ctx = create_test_context();
        let metadata = MetricChannel::new(&StaticMetadata::default())
            .assemble(&Invocation::new(&ctx));
        assert_eq!(metadata.get_str("Region"), Some("eu-north-1"));
    });
}

#[test]
fn test_resolve_with_map() {
    let env: HashMap<String, String> =
        HashMap::from([(AWS_REGION.to_string(), "us-east-2".to_string())]);
    assert_eq!(resolve(&env, AWS_REGION, UNKNOWN), "us-east-2");
    assert_eq!(resolve(&env, "AWS_EXECUTION_ENV", UNKNOWN), UNKNOWN);
}

#[test]
fn test_generated_values_per_assembly() {
    let event = create_test_event();
    let ctx = create_test_context();
    let channel = LogChannel::new(&StaticMetadata::default());

    let first = channel.assemble(&event, &Invocation::new(&ctx));
    let second = channel.assemble(&event, &Invocation::new(&ctx));

    let first_id = Uuid::parse_str(first.get_str("id").unwrap()).unwrap();
    let second_id = Uuid::parse_str(second.get_str("id").unwrap()).unwrap();
    assert_eq!(first_id.get_version_num(), 4);
    assert_ne!(first_id, second_id);

    let timestamp = chrono::DateTime::parse_from_rfc3339(first.get_str("timestamp").unwrap())
        .unwrap()
        .timestamp_millis();
    assert_eq!(
        first.get_str("timestampEpoch"),
        Some(timestamp.to_string().as_str())
    );
}

#[test]
fn test_log_emit_uses_persistent_attributes() {
    let event = create_test_event();
    let ctx = create_test_context();
    let config = Config::default();
    let channel = LogChannel::from_config(&config);
    let provider = CapturingLoggerProvider::default();

    let metadata = channel.assemble(&event, &Invocation::new(&ctx));
    channel.emit(&provider, metadata.clone()).unwrap();

    let entries = provider.entries.borrow();
    assert_eq!(entries.len(), 1);
    let (service, message, attributes) = &entries[0];
    assert_eq!(service, "UserSignUp");
    assert_eq!(message, "Hello World");
    assert_eq!(attributes, &metadata);
}

#[test]
fn test_metric_flush_exactly_once() {
    let ctx = create_test_context();
    let channel = MetricChannel::from_config(&Config::default());
    let mut recorder = CapturingRecorder::default();

    let metadata = channel.assemble(&Invocation::new(&ctx));
    channel.emit(&mut recorder, metadata.clone()).unwrap();

    assert_eq!(recorder.flushes, 1);
    assert_eq!(recorder.metrics.len(), 1);
    assert_eq!(recorder.metrics[0].0, "Duration");
    assert_eq!(recorder.metrics[0].2, 83.0);
    assert_eq!(recorder.dimensions, vec![("User".into(), "Name".into())]);
    assert_eq!(recorder.metadata, metadata);
    assert_eq!(
        metadata.get_str("LogStreamName"),
        Some("2022/07/09/[$LATEST]159282acddb84ca0bc0d5f325ea01343")
    );
}

#[test]
fn test_trace_span_closed_and_parent_restored() {
    let event = create_test_event();
    let mut tracer = CapturingTracer::default();

    let metadata = TraceChannel::from_config(&Config::default()).trace(&mut tracer, &event, || {});

    assert!(tracer.open.is_empty());
    assert_eq!(tracer.active, 0);
    assert_eq!(tracer.active_during_close, Some(1));
    assert_eq!(tracer.annotations.get(&1), Some(&metadata));
    assert!(!tracer.annotations.contains_key(&0));
    assert_eq!(metadata.get_str("spanId"), Some("0000000000000001"));
    assert_eq!(
        metadata.get_str("correlationId"),
        Some("77375676-xmpl-4b79-853a-f982474efe18")
    );
}
