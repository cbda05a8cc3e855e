//! Trace ID 中间件
//! 每个请求携带一个 trace_id：写入请求扩展、日志 span 与响应头

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// 请求扩展中的 trace_id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

impl TraceId {
    /// 优先沿用调用方传入的请求头，否则生成新的
    pub fn from_request(req: &Request) -> Self {
        req.headers()
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(|| Self(Uuid::new_v4().to_string()))
    }
}

pub async fn trace_id_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::from_request(&req);
    req.extensions_mut().insert(trace_id.clone());

    let span = tracing::info_span!("request", trace_id = %trace_id.0);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id.0) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    #[test]
    fn test_incoming_header_is_reused() {
        let req = Request::builder()
            .header(TRACE_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(TraceId::from_request(&req).0, "abc-123");
    }

    #[test]
    fn test_missing_header_generates_uuid() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = TraceId::from_request(&req);
        assert!(Uuid::parse_str(&id.0).is_ok());
    }
}
