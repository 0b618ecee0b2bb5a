//! Cache Refresh Background Task
//!
//! Runs the fetch → diff → regenerate sequence for known tenants without a
//! request driving it. It is triggered by a timer (when an interval is
//! configured) and by [`CacheEvent`]s sent over a channel, for example on
//! SIGHUP or by an embedding application that knows storage changed.
//!
//! The task calls [`IndexCache::refresh`], the same entry point the write
//! handlers use, so a timer-driven rebuild joins an in-flight
//! request-driven one instead of racing it.

use chartmill_core::{ServerConfig, TenantKey};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::IndexCache;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the cache refresh background task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRefreshConfig {
    /// Timer period. Zero disables the timer; events are still handled.
    pub interval: Duration,
}

impl CacheRefreshConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            interval: config.cache_interval,
        }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn timer_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// A request to refresh cached indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Refresh one tenant, creating its slot if it is not known yet.
    Tenant(TenantKey),
    /// Refresh every known tenant.
    All,
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for refresh activity since startup.
#[derive(Debug, Default)]
pub struct CacheRefreshMetrics {
    /// Refresh passes started, by timer or event
    pub refresh_cycles: AtomicU64,

    /// Events received on the channel
    pub events_received: AtomicU64,

    /// Tenant refreshes that completed
    pub tenants_refreshed: AtomicU64,

    /// Tenant refreshes that installed a new index
    pub indexes_changed: AtomicU64,

    /// Tenant refreshes that failed
    pub refresh_errors: AtomicU64,
}

impl CacheRefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> CacheRefreshSnapshot {
        CacheRefreshSnapshot {
            refresh_cycles: self.refresh_cycles.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            tenants_refreshed: self.tenants_refreshed.load(Ordering::Relaxed),
            indexes_changed: self.indexes_changed.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of refresh metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRefreshSnapshot {
    pub refresh_cycles: u64,
    pub events_received: u64,
    pub tenants_refreshed: u64,
    pub indexes_changed: u64,
    pub refresh_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that refreshes tenant indexes.
///
/// Runs until the shutdown signal is received or its sender is dropped.
/// Returns the metrics collected over the task's lifetime.
pub async fn cache_refresh_task(
    cache: Arc<IndexCache>,
    config: CacheRefreshConfig,
    mut events: mpsc::Receiver<CacheEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheRefreshMetrics> {
    let metrics = Arc::new(CacheRefreshMetrics::new());

    let timer_enabled = config.timer_enabled();
    let mut refresh_interval = interval(if timer_enabled {
        config.interval
    } else {
        Duration::from_secs(3600)
    });
    refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events_open = true;

    tracing::info!(
        interval_ms = config.interval.as_millis() as u64,
        timer_enabled,
        "Cache refresh task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache refresh task shutting down");
                    break;
                }
            }

            _ = refresh_interval.tick(), if timer_enabled => {
                refresh_all(&cache, &metrics).await;
            }

            event = events.recv(), if events_open => {
                match event {
                    Some(event) => {
                        metrics.events_received.fetch_add(1, Ordering::Relaxed);
                        handle_event(&cache, &metrics, event).await;
                    }
                    None => {
                        tracing::debug!("Cache event channel closed");
                        events_open = false;
                    }
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        refresh_cycles = snapshot.refresh_cycles,
        events_received = snapshot.events_received,
        tenants_refreshed = snapshot.tenants_refreshed,
        indexes_changed = snapshot.indexes_changed,
        refresh_errors = snapshot.refresh_errors,
        "Cache refresh task completed"
    );

    metrics
}

async fn handle_event(cache: &IndexCache, metrics: &CacheRefreshMetrics, event: CacheEvent) {
    match event {
        CacheEvent::Tenant(key) => {
            metrics.refresh_cycles.fetch_add(1, Ordering::Relaxed);
            refresh_tenant(cache, metrics, &key).await;
        }
        CacheEvent::All => refresh_all(cache, metrics).await,
    }
}

/// One pass over every known tenant. The builds run concurrently and the
/// cache's limiter bounds how many hit storage at once.
async fn refresh_all(cache: &IndexCache, metrics: &CacheRefreshMetrics) {
    metrics.refresh_cycles.fetch_add(1, Ordering::Relaxed);

    let keys = cache.tenant_keys();
    if keys.is_empty() {
        tracing::trace!("Cache refresh cycle with no known tenants");
        return;
    }

    join_all(keys.iter().map(|key| refresh_tenant(cache, metrics, key))).await;
    tracing::debug!(tenants = keys.len(), "Cache refresh cycle completed");
}

async fn refresh_tenant(cache: &IndexCache, metrics: &CacheRefreshMetrics, key: &TenantKey) {
    match cache.refresh(key).await {
        Ok(outcome) => {
            metrics.tenants_refreshed.fetch_add(1, Ordering::Relaxed);
            if outcome.changed {
                metrics.indexes_changed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    tenant = %key,
                    versions = outcome.index.version_count(),
                    "Index refreshed"
                );
            } else {
                tracing::debug!(tenant = %key, "Index unchanged");
            }
        }
        Err(e) => {
            metrics.refresh_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(tenant = %key, error = %e, "Index refresh failed");
        }
    }
}
