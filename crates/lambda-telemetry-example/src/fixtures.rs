//! Sample invocation inputs.
//!
//! A REST API (v1) request for `GET /` on stage `prod`, and the invocation
//! context Lambda would pass alongside it.

use aws_lambda_events::apigw::ApiGatewayProxyRequest;
use lambda_runtime::{Config as LambdaConfig, Context as LambdaContext, LambdaEvent};
use std::sync::Arc;

const SAMPLE_EVENT: &str = include_str!("../fixtures/api_gateway_event.json");

/// Lambda request id of the sample context.
pub const SAMPLE_REQUEST_ID: &str = "6c933bd2-9535-45a8-b09c-84d00b4f50cc";

/// API Gateway request id of the sample event.
pub const SAMPLE_GATEWAY_REQUEST_ID: &str = "77375676-xmpl-4b79-853a-f982474efe18";

/// Parses the sample API Gateway event.
///
/// # Errors
///
/// Returns an error if the bundled fixture does not parse.
pub fn sample_event() -> serde_json::Result<ApiGatewayProxyRequest> {
    serde_json::from_str(SAMPLE_EVENT)
}

/// Builds the sample invocation context.
pub fn sample_context() -> LambdaContext {
    let mut config = LambdaConfig::default();
    config.function_name = "somestack-FunctionName".to_string();
    config.version = "$LATEST".to_string();
    config.memory = 1024;
    config.log_group = "/aws/lambda/somestack-FunctionName".to_string();
    config.log_stream = "2022/07/09/[$LATEST]159282acddb84ca0bc0d5f325ea01343".to_string();

    let mut ctx = LambdaContext::default();
    ctx.request_id = SAMPLE_REQUEST_ID.to_string();
    ctx.invoked_function_arn =
        "arn:aws:lambda:eu-north-1:123412341234:function:somestack-FunctionName".to_string();
    ctx.env_config = Arc::new(config);
    ctx
}

/// The sample event and context as one invocation.
///
/// # Errors
///
/// Returns an error if the bundled fixture does not parse.
pub fn sample_invocation() -> serde_json::Result<LambdaEvent<ApiGatewayProxyRequest>> {
    Ok(LambdaEvent::new(sample_event()?, sample_context()))
}
