//! Prometheus Metrics Definitions
//!
//! Defines the chartmill metrics with their labels and exposes a /metrics
//! endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_counter,
    CounterVec, Encoder, Gauge, HistogramVec, IntCounter, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<ChartmillMetrics>> = Lazy::new(ChartmillMetrics::new);

/// Access the global metrics.
pub fn metrics() -> Result<&'static ChartmillMetrics, &'static ApiError> {
    METRICS.as_ref()
}

/// Container for all chartmill metrics.
#[derive(Clone)]
pub struct ChartmillMetrics {
    /// HTTP request counter - labels: method, route, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, route
    pub http_request_duration_seconds: HistogramVec,

    /// Object list fetches - labels: outcome (ok/error)
    pub index_fetches_total: CounterVec,

    /// Index regenerations - labels: outcome (changed/unchanged/error)
    pub index_regenerations_total: CounterVec,

    /// Storage listings actually issued to the backend
    pub storage_list_calls_total: IntCounter,

    /// Chart packages skipped because they failed to parse
    pub chart_parse_failures_total: IntCounter,

    /// Tenants with a cache slot
    pub known_tenants: Gauge,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {name}: {e}"))
}

impl ChartmillMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "chartmill_http_requests_total",
                "Total number of HTTP requests",
                &["method", "route", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "chartmill_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "route"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            index_fetches_total: register_counter_vec!(
                "chartmill_index_fetches_total",
                "Object list fetches delivered to callers",
                &["outcome"]
            )
            .map_err(|e| registration_error("index_fetches_total", e))?,

            index_regenerations_total: register_counter_vec!(
                "chartmill_index_regenerations_total",
                "Index regenerations delivered to callers",
                &["outcome"]
            )
            .map_err(|e| registration_error("index_regenerations_total", e))?,

            storage_list_calls_total: register_int_counter!(
                "chartmill_storage_list_calls_total",
                "Storage listings issued to the backend"
            )
            .map_err(|e| registration_error("storage_list_calls_total", e))?,

            chart_parse_failures_total: register_int_counter!(
                "chartmill_chart_parse_failures_total",
                "Chart packages skipped because they failed to parse"
            )
            .map_err(|e| registration_error("chart_parse_failures_total", e))?,

            known_tenants: register_gauge!(
                "chartmill_known_tenants",
                "Number of tenants with a cache slot"
            )
            .map_err(|e| registration_error("known_tenants", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, route, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, route])
            .observe(duration_secs);
    }

    pub fn record_fetch(&self, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.index_fetches_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_regeneration(&self, outcome: &str) {
        self.index_regenerations_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_storage_list(&self) {
        self.storage_list_calls_total.inc();
    }

    pub fn record_parse_failure(&self) {
        self.chart_parse_failures_total.inc();
    }

    pub fn set_known_tenants(&self, count: usize) {
        self.known_tenants.set(count as f64);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
