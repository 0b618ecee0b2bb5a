//! Background jobs for the chartmill server
//!
//! - `cache_refresh`: keeps tenant indexes warm on a timer and on demand
//!
//! # Usage
//!
//! ```ignore
//! use chartmill_api::jobs::{cache_refresh_task, CacheEvent, CacheRefreshConfig};
//! use tokio::sync::{mpsc, watch};
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let (events_tx, events_rx) = mpsc::channel::<CacheEvent>(16);
//!
//! let config = CacheRefreshConfig::from_server_config(&server_config);
//! tokio::spawn(cache_refresh_task(cache.clone(), config, events_rx, shutdown_rx));
//!
//! // Force a refresh of every known tenant
//! let _ = events_tx.send(CacheEvent::All).await;
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod cache_refresh;

pub use cache_refresh::{
    cache_refresh_task, CacheEvent, CacheRefreshConfig, CacheRefreshMetrics, CacheRefreshSnapshot,
};
