//! Per-tenant index cache.
//!
//! Reads go through [`IndexCache::get_index`]: a populated entry is returned
//! as is, an empty one triggers fetch → diff → regenerate. Both the fetch and
//! the regeneration are single-flight per tenant (see [`flight`]) and gated
//! by the server-wide [`BuildLimiter`]. The background refresh job and the
//! write handlers use [`IndexCache::refresh`], which runs the same sequence
//! through the same flights, so there is only ever one writer per entry.

pub mod build;
pub mod flight;
pub mod limiter;
pub mod registry;

pub use build::IndexBuilder;
pub use flight::Flight;
pub use limiter::BuildLimiter;
pub use registry::{CacheEntry, TenantRegistry, TenantSlot};

use chartmill_core::{
    IndexError, IndexFile, ObjectDescriptor, ObjectSliceDiff, ServerConfig, TenantKey,
    STATEFILE_NAME,
};
use chartmill_storage::{ChartParser, StorageBackend};
use std::sync::Arc;
use std::time::Duration;

use crate::telemetry::metrics;

// ============================================================================
// SETTINGS AND RESULTS
// ============================================================================

/// Knobs of the cache taken from the server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub timestamp_tolerance: Duration,
    pub max_objects: usize,
    pub use_statefiles: bool,
    /// Absolute download base including the context path, or `None` for
    /// relative `charts/<file>` URLs.
    pub chart_base_url: Option<String>,
    pub index_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl CacheSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            timestamp_tolerance: config.timestamp_tolerance,
            max_objects: config.max_storage_objects,
            use_statefiles: config.use_statefiles,
            chart_base_url: config.chart_base_url(),
            index_limit: config.effective_index_limit(),
        }
    }
}

/// Result of one regeneration worker run.
#[derive(Debug, Clone)]
pub struct Regenerated {
    pub index: Arc<IndexFile>,
    /// False when the worker found nothing to do.
    pub changed: bool,
}

/// Result of [`IndexCache::refresh`].
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub changed: bool,
    pub index: Arc<IndexFile>,
}

// ============================================================================
// INDEX CACHE
// ============================================================================

/// The tenant registry plus the collaborators needed to (re)build indexes.
pub struct IndexCache {
    storage: Arc<dyn StorageBackend>,
    parser: Arc<dyn ChartParser>,
    registry: TenantRegistry,
    limiter: BuildLimiter,
    settings: CacheSettings,
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache")
            .field("storage", &self.storage.name())
            .field("tenants", &self.registry.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl IndexCache {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        parser: Arc<dyn ChartParser>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            storage,
            parser,
            registry: TenantRegistry::new(),
            limiter: BuildLimiter::new(settings.index_limit),
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn limiter(&self) -> &BuildLimiter {
        &self.limiter
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    pub fn tenant_keys(&self) -> Vec<TenantKey> {
        self.registry.keys()
    }

    /// Current entry for a tenant without triggering any work.
    pub fn peek(&self, key: &TenantKey) -> Option<CacheEntry> {
        self.registry.get(key).map(|slot| slot.entry())
    }

    /// Get the slot for a tenant, warm-starting it from its statefile the
    /// first time it is seen.
    async fn slot(&self, key: &TenantKey) -> Arc<TenantSlot> {
        let (slot, created) = self.registry.slot(key);
        if created {
            if let Ok(m) = metrics() {
                m.set_known_tenants(self.registry.len());
            }
        }
        if self.settings.use_statefiles {
            slot.warm_start
                .get_or_init(|| self.load_statefile(&slot))
                .await;
        }
        slot
    }

    async fn load_statefile(&self, slot: &TenantSlot) {
        let path = slot.key().object_path(STATEFILE_NAME);
        let stored = match self.storage.get_object(&path).await {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                tracing::warn!(tenant = %slot.key(), error = %e, "Failed to read statefile");
                return;
            }
        };

        let raw = String::from_utf8_lossy(&stored.content);
        match IndexFile::from_yaml(&raw) {
            Ok(index) => {
                tracing::info!(
                    tenant = %slot.key(),
                    versions = index.version_count(),
                    "Warm-started index from statefile"
                );
                slot.replace_entry(CacheEntry::warm(index));
            }
            Err(e) => {
                tracing::warn!(tenant = %slot.key(), error = %e, "Ignoring unreadable statefile");
            }
        }
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Index for a tenant, building it if the entry was never populated.
    pub async fn get_index(&self, key: &TenantKey) -> Result<Arc<IndexFile>, IndexError> {
        let slot = self.slot(key).await;
        let current = slot.entry();
        if !current.is_empty() {
            tracing::trace!(tenant = %key, "Index cache hit");
            return Ok(current.index);
        }

        let objects = self.fetch_slot(&slot).await?;
        let diff = ObjectSliceDiff::compute(
            &current.objects,
            &objects,
            self.settings.timestamp_tolerance,
        );
        if !diff.changed {
            tracing::debug!(tenant = %key, "No change detected between cache and storage");
            return Ok(current.index);
        }

        let regenerated = self.regenerate_slot(&slot, objects).await?;
        Ok(regenerated.index)
    }

    /// Fetch, diff and regenerate regardless of whether the entry is empty.
    pub async fn refresh(&self, key: &TenantKey) -> Result<RefreshOutcome, IndexError> {
        let slot = self.slot(key).await;
        let current = slot.entry();
        let objects = self.fetch_slot(&slot).await?;
        let diff = ObjectSliceDiff::compute(
            &current.objects,
            &objects,
            self.settings.timestamp_tolerance,
        );
        if !diff.changed {
            tracing::debug!(tenant = %key, "Refresh found no changes");
            return Ok(RefreshOutcome {
                changed: false,
                index: current.index,
            });
        }

        let regenerated = self.regenerate_slot(&slot, objects).await?;
        Ok(RefreshOutcome {
            changed: regenerated.changed,
            index: regenerated.index,
        })
    }

    // ========================================================================
    // FETCH COORDINATOR
    // ========================================================================

    /// Current chart packages for a tenant, sharing one listing between
    /// concurrent callers.
    pub async fn fetch(&self, key: &TenantKey) -> Result<Arc<Vec<ObjectDescriptor>>, IndexError> {
        let slot = self.slot(key).await;
        self.fetch_slot(&slot).await
    }

    async fn fetch_slot(
        &self,
        slot: &TenantSlot,
    ) -> Result<Arc<Vec<ObjectDescriptor>>, IndexError> {
        let key = slot.key().clone();
        let storage = Arc::clone(&self.storage);
        let limiter = self.limiter.clone();

        let result = slot
            .fetch
            .run(slot.key().as_str(), move || async move {
                let _permit = limiter.acquire().await?;
                if let Ok(m) = metrics() {
                    m.record_storage_list();
                }
                let mut objects: Vec<ObjectDescriptor> = storage
                    .list_objects(key.as_str())
                    .await
                    .map_err(|e| IndexError::backend(key.as_str(), &e))?
                    .into_iter()
                    .filter(ObjectDescriptor::is_chart_package)
                    .collect();
                objects.sort_by(|a, b| a.path.cmp(&b.path));
                tracing::debug!(tenant = %key, objects = objects.len(), "Fetched object list");
                Ok(Arc::new(objects))
            })
            .await;

        if let Ok(m) = metrics() {
            m.record_fetch(result.is_ok());
        }
        if let Err(e) = &result {
            tracing::error!(tenant = %slot.key(), error = %e, "Object fetch failed");
        }
        result
    }

    // ========================================================================
    // REGENERATION COORDINATOR
    // ========================================================================

    /// Rebuild a tenant's index from `objects`, sharing one worker between
    /// concurrent callers.
    pub async fn regenerate(
        &self,
        key: &TenantKey,
        objects: Arc<Vec<ObjectDescriptor>>,
    ) -> Result<Regenerated, IndexError> {
        let slot = self.slot(key).await;
        self.regenerate_slot(&slot, objects).await
    }

    async fn regenerate_slot(
        &self,
        slot: &Arc<TenantSlot>,
        objects: Arc<Vec<ObjectDescriptor>>,
    ) -> Result<Regenerated, IndexError> {
        let worker_slot = Arc::clone(slot);
        let builder = IndexBuilder::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.parser),
            self.settings.clone(),
        );
        let limiter = self.limiter.clone();

        let result = slot
            .regeneration
            .run(slot.key().as_str(), move || async move {
                let _permit = limiter.acquire().await?;
                builder.run(&worker_slot, &objects).await
            })
            .await;

        if let Ok(m) = metrics() {
            m.record_regeneration(match &result {
                Ok(r) if r.changed => "changed",
                Ok(_) => "unchanged",
                Err(_) => "error",
            });
        }
        if let Err(e) = &result {
            tracing::error!(tenant = %slot.key(), error = %e, "Index regeneration failed");
        }
        result
    }
}
