//! Tracing subscriber initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str = "chartmill_api=debug,chartmill_storage=info,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Emit JSON lines instead of human-readable output
    pub log_json: bool,
    /// Log /health requests (noisy under load balancer probes)
    pub log_health: bool,
    /// Expose the Prometheus /metrics endpoint
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("CHARTMILL_SERVICE_NAME")
                .unwrap_or_else(|_| "chartmill".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_json: false,
            log_health: false,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_server_config(config: &chartmill_core::ServerConfig) -> Self {
        Self {
            log_json: config.log_json,
            log_health: config.log_health,
            metrics_enabled: !config.disable_metrics,
            ..Self::default()
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup before anything logs. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let init = if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    init.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        service_version = %config.service_version,
        log_json = config.log_json,
        metrics_enabled = config.metrics_enabled,
        "Telemetry initialized"
    );

    Ok(())
}
