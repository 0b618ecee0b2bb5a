//! chartmill server entry point
//!
//! Reads configuration from the environment, wires storage, the index cache
//! and the refresh job, and serves HTTP until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use chartmill_api::{
    cache_refresh_task, create_router, storage_from_config, ApiError, ApiResult, AppState,
    CacheEvent, CacheRefreshConfig,
};
use chartmill_core::ServerConfig;
use chartmill_storage::TarballChartParser;
use tokio::sync::{mpsc, watch};

use chartmill_api::telemetry::{init_tracer, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = ServerConfig::from_env()?;
    init_tracer(&TelemetryConfig::from_server_config(&config))?;
    config.validate()?;

    let storage = storage_from_config(&config)?;
    tracing::info!(
        storage = storage.name(),
        depth = config.depth,
        depth_dynamic = config.depth_dynamic,
        context_path = %config.context_path,
        "Configured chart storage"
    );

    let addr = resolve_bind_addr(&config)?;
    let refresh_config = CacheRefreshConfig::from_server_config(&config);
    let event_capacity = config.effective_index_limit();

    let state = AppState::new(config, storage, Arc::new(TarballChartParser::new()));
    let cache = state.cache.clone();
    let app = create_router(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel::<CacheEvent>(event_capacity);
    let refresh_handle = tokio::spawn(cache_refresh_task(
        cache,
        refresh_config,
        events_rx,
        shutdown_rx,
    ));
    spawn_reload_listener(events_tx);

    tracing::info!(%addr, "Starting chartmill server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = refresh_handle.await {
        tracing::warn!(error = %e, "Cache refresh task ended abnormally");
    }
    Ok(())
}

/// Forward SIGHUP to the refresh job as a full refresh.
#[cfg(unix)]
fn spawn_reload_listener(events: mpsc::Sender<CacheEvent>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler not installed");
            return;
        }
    };

    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            tracing::info!("SIGHUP received, refreshing all tenants");
            if events.send(CacheEvent::All).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(events: mpsc::Sender<CacheEvent>) {
    drop(events);
}

fn resolve_bind_addr(config: &ServerConfig) -> ApiResult<SocketAddr> {
    let addr = format!("{}:{}", config.bind, config.port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
