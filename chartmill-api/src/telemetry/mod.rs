//! chartmill Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the
//! server and the index cache.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, ChartmillMetrics, METRICS};
pub use middleware::{observability_middleware, RequestLogSettings, RouteLabel, REQUEST_ID_HEADER};
pub use tracer::{init_tracer, TelemetryConfig};
