//! Shared application state for the Axum router.

use std::sync::Arc;

use chartmill_core::{ServerConfig, StorageKind};
use chartmill_storage::{ChartParser, InMemoryBackend, LocalFilesystemBackend, StorageBackend};

use crate::cache::{CacheSettings, IndexCache};
use crate::error::{ApiError, ApiResult};
use crate::router::RouteTable;
use crate::routes::{route_table, Endpoint};

/// Application-wide state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<IndexCache>,
    pub storage: Arc<dyn StorageBackend>,
    pub parser: Arc<dyn ChartParser>,
    pub config: Arc<ServerConfig>,
    pub routes: Arc<RouteTable<Endpoint>>,
}

impl AppState {
    /// Wire the cache and route table for `config`.
    pub fn new(
        config: ServerConfig,
        storage: Arc<dyn StorageBackend>,
        parser: Arc<dyn ChartParser>,
    ) -> Self {
        let settings = CacheSettings::from_config(&config);
        let cache = Arc::new(IndexCache::new(storage.clone(), parser.clone(), settings));
        Self {
            cache,
            storage,
            parser,
            config: Arc::new(config),
            routes: Arc::new(route_table()),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("cache", &self.cache)
            .field("storage", &self.storage.name())
            .field("routes", &self.routes.routes().len())
            .finish()
    }
}

/// Storage backend selected by the configuration.
pub fn storage_from_config(config: &ServerConfig) -> ApiResult<Arc<dyn StorageBackend>> {
    match config.storage {
        StorageKind::Memory => Ok(Arc::new(InMemoryBackend::new())),
        StorageKind::Local => {
            let root = config.storage_local_rootdir.clone().ok_or_else(|| {
                ApiError::invalid_input("local storage requires CHARTMILL_STORAGE_LOCAL_ROOTDIR")
            })?;
            Ok(Arc::new(LocalFilesystemBackend::new(root)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartmill_storage::TarballChartParser;

    #[test]
    fn test_storage_from_config() {
        let memory = storage_from_config(&ServerConfig::default()).unwrap();
        assert_eq!(memory.name(), "memory");

        let local = storage_from_config(&ServerConfig::default().with_local_storage("/tmp/charts"))
            .unwrap();
        assert_eq!(local.name(), "local");

        let mut missing_root = ServerConfig::default();
        missing_root.storage = StorageKind::Local;
        assert!(storage_from_config(&missing_root).is_err());
    }

    #[test]
    fn test_state_uses_config_settings() {
        let config = ServerConfig::default()
            .with_index_limit(3)
            .with_chart_url("https://charts.example.com");
        let state = AppState::new(
            config,
            Arc::new(InMemoryBackend::new()),
            Arc::new(TarballChartParser::new()),
        );
        assert_eq!(state.cache.limiter().capacity(), 3);
        assert_eq!(
            state.cache.settings().chart_base_url.as_deref(),
            Some("https://charts.example.com")
        );
        assert_eq!(state.routes.routes().len(), 6);
    }
}
