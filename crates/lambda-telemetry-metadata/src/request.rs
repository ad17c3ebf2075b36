//! Read access to inbound API Gateway requests.
//!
//! REST API (v1) and HTTP API (v2) events carry the same facts in
//! different places. [`GatewayRequest`] gives the assemblers one view over
//! both:
//!
//! | Fact | v1 (`ApiGatewayProxyRequest`) | v2 (`ApiGatewayV2httpRequest`) |
//! |------|-------------------------------|--------------------------------|
//! | account id | `requestContext.accountId` | `requestContext.accountId` |
//! | stage | `requestContext.stage` | `requestContext.stage` |
//! | request id | `requestContext.requestId` | `requestContext.requestId` |
//! | request epoch | `requestContext.requestTimeEpoch` | `requestContext.timeEpoch` |
//! | path | `path` | `rawPath` |
//! | user | `requestContext.identity.user` | not available |
//! | source IP | `requestContext.identity.sourceIp` | `requestContext.http.sourceIp` |

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayV2httpRequest};
use http::HeaderMap;

/// Header carrying the viewer country when the API sits behind CloudFront.
pub const CLOUDFRONT_VIEWER_COUNTRY: &str = "cloudfront-viewer-country";

/// Uniform read access to an API Gateway request.
///
/// Every accessor returns `None` when the field is absent; callers decide
/// on substitutes.
pub trait GatewayRequest {
    /// AWS account that owns the API.
    fn account_id(&self) -> Option<&str>;

    /// Deployment stage, e.g. `prod`.
    fn stage(&self) -> Option<&str>;

    /// API Gateway request identifier.
    fn request_id(&self) -> Option<&str>;

    /// Time the request was received, in epoch milliseconds.
    fn request_time_epoch(&self) -> i64;

    /// Request path.
    fn path(&self) -> Option<&str>;

    /// Authenticated user, when the identity carries one.
    fn user(&self) -> Option<&str>;

    /// Client IP address.
    fn source_ip(&self) -> Option<&str>;

    /// Request headers.
    fn headers(&self) -> &HeaderMap;

    /// Looks up a header value. Header names are matched case-insensitively.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }
}

impl GatewayRequest for ApiGatewayProxyRequest {
    fn account_id(&self) -> Option<&str> {
        self.request_context.account_id.as_deref()
    }

    fn stage(&self) -> Option<&str> {
        self.request_context.stage.as_deref()
    }

    fn request_id(&self) -> Option<&str> {
        self.request_context.request_id.as_deref()
    }

    fn request_time_epoch(&self) -> i64 {
        self.request_context.request_time_epoch
    }

    fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn user(&self) -> Option<&str> {
        self.request_context.identity.user.as_deref()
    }

    fn source_ip(&self) -> Option<&str> {
        self.request_context.identity.source_ip.as_deref()
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl GatewayRequest for ApiGatewayV2httpRequest {
    fn account_id(&self) -> Option<&str> {
        self.request_context.account_id.as_deref()
    }

    fn stage(&self) -> Option<&str> {
        self.request_context.stage.as_deref()
    }

    fn request_id(&self) -> Option<&str> {
        self.request_context.request_id.as_deref()
    }

    fn request_time_epoch(&self) -> i64 {
        self.request_context.time_epoch
    }

    fn path(&self) -> Option<&str> {
        self.raw_path.as_deref()
    }

    fn user(&self) -> Option<&str> {
        None
    }

    fn source_ip(&self) -> Option<&str> {
        self.request_context.http.source_ip.as_deref()
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn create_test_v1_event() -> ApiGatewayProxyRequest {
        let mut event = ApiGatewayProxyRequest::default();
        event.path = Some("/".to_string());
        event.request_context.account_id = Some("123456789012".to_string());
        event.request_context.stage = Some("prod".to_string());
        event.request_context.request_id = Some("77375676-xmpl-4b79-853a-f982474efe18".to_string());
        event.request_context.request_time_epoch = 1_583_798_639_428;
        event.request_context.identity.source_ip = Some("192.168.0.1".to_string());
        event
            .headers
            .insert("cloudfront-viewer-country", HeaderValue::from_static("SE"));
        event
    }

    #[test]
    fn test_v1_accessors() {
        let event = create_test_v1_event();

        assert_eq!(event.account_id(), Some("123456789012"));
        assert_eq!(event.stage(), Some("prod"));
        assert_eq!(
            event.request_id(),
            Some("77375676-xmpl-4b79-853a-f982474efe18")
        );
        assert_eq!(event.request_time_epoch(), 1_583_798_639_428);
        assert_eq!(event.path(), Some("/"));
        assert_eq!(event.user(), None);
        assert_eq!(event.source_ip(), Some("192.168.0.1"));
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let event = create_test_v1_event();

        assert_eq!(event.header(CLOUDFRONT_VIEWER_COUNTRY), Some("SE"));
        assert_eq!(event.header("CloudFront-Viewer-Country"), Some("SE"));
        assert_eq!(event.header("x-missing"), None);
    }

    #[test]
    fn test_v2_accessors() {
        let mut event = ApiGatewayV2httpRequest::default();
        event.raw_path = Some("/users/123".to_string());
        event.request_context.account_id = Some("123456789012".to_string());
        event.request_context.stage = Some("$default".to_string());
        event.request_context.time_epoch = 1_704_067_200_000;
        event.request_context.http.source_ip = Some("203.0.113.42".to_string());

        assert_eq!(event.account_id(), Some("123456789012"));
        assert_eq!(event.stage(), Some("$default"));
        assert_eq!(event.request_time_epoch(), 1_704_067_200_000);
        assert_eq!(event.path(), Some("/users/123"));
        assert_eq!(event.user(), None);
        assert_eq!(event.source_ip(), Some("203.0.113.42"));
    }
}
