//! Axum middleware for request tracing and metrics.
//!
//! Every request gets an `X-Request-Id` (the client's, when it sent one), a
//! tracing span, a completion log line and Prometheus samples. Metrics are
//! labelled by the matched endpoint rather than the raw path so tenant names
//! never become label values.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::metrics;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Endpoint label a handler attaches to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLabel(pub &'static str);

/// Settings for [`observability_middleware`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogSettings {
    pub log_health: bool,
}

/// Observability middleware for Axum.
pub async fn observability_middleware(
    State(settings): State<RequestLogSettings>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        request_id = %request_id,
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    let duration = start.elapsed();
    let status = response.status();
    let route = response
        .extensions()
        .get::<RouteLabel>()
        .map_or("unmatched", |label| label.0);

    if let Ok(m) = metrics() {
        m.record_http_request(method.as_str(), route, status.as_u16(), duration.as_secs_f64());
    }

    if route != "health" || settings.log_health {
        tracing::info!(
            method = %method,
            path = %path,
            route,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            request_id = %request_id,
            "Request completed"
        );
    }

    response
}
