//! Tenant registry and per-tenant cache slots.

use chartmill_core::{IndexFile, ObjectDescriptor, TenantKey};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;

use super::flight::Flight;
use super::Regenerated;

/// A tenant's cached index and the object list it was built from.
///
/// `versions` holds every parsed record; `index` is what gets served, with
/// the max-objects bound applied. Keeping both lets a version dropped by the
/// bound come back once newer ones are deleted.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub objects: Arc<Vec<ObjectDescriptor>>,
    pub versions: Arc<IndexFile>,
    pub index: Arc<IndexFile>,
    pub populated: bool,
}

impl CacheEntry {
    pub fn empty() -> Self {
        let index = Arc::new(IndexFile::new());
        Self {
            objects: Arc::new(Vec::new()),
            versions: Arc::clone(&index),
            index,
            populated: false,
        }
    }

    /// Entry restored from a statefile snapshot.
    pub fn warm(index: IndexFile) -> Self {
        let index = Arc::new(index);
        Self {
            objects: Arc::new(index.objects()),
            versions: Arc::clone(&index),
            index,
            populated: true,
        }
    }

    /// Whether no regeneration or warm start has filled this entry yet.
    /// The read path treats an empty entry as a cache miss.
    pub fn is_empty(&self) -> bool {
        !self.populated
    }
}

/// Everything the server keeps for one tenant key.
///
/// The entry is only replaced by the regeneration worker, which the
/// regeneration flight keeps to one at a time per tenant. The lock around it
/// is held just long enough to clone or swap the two `Arc`s.
#[derive(Debug)]
pub struct TenantSlot {
    key: TenantKey,
    entry: RwLock<CacheEntry>,
    pub(crate) fetch: Flight<Arc<Vec<ObjectDescriptor>>>,
    pub(crate) regeneration: Flight<Regenerated>,
    pub(crate) warm_start: OnceCell<()>,
}

impl TenantSlot {
    pub fn new(key: TenantKey) -> Self {
        Self {
            key,
            entry: RwLock::new(CacheEntry::empty()),
            fetch: Flight::new("fetch"),
            regeneration: Flight::new("regenerate"),
            warm_start: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &TenantKey {
        &self.key
    }

    pub fn entry(&self) -> CacheEntry {
        self.entry.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn replace_entry(&self, entry: CacheEntry) {
        *self.entry.write().unwrap_or_else(|e| e.into_inner()) = entry;
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.fetch.in_flight()
    }

    pub fn regeneration_in_flight(&self) -> bool {
        self.regeneration.in_flight()
    }

    /// Callers waiting on the in-flight fetch, leader included.
    pub fn fetch_waiters(&self) -> usize {
        self.fetch.waiter_count()
    }
}

/// Concurrent map from tenant key to slot.
///
/// Slots are created on first access and never removed. Creation goes
/// through the map's entry API so two racing first requests end up sharing
/// one slot; the shard lock is held only for the insert.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    slots: DashMap<TenantKey, Arc<TenantSlot>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the slot for `key`, creating it if this is the first access.
    /// Returns the slot and whether it was just created.
    pub fn slot(&self, key: &TenantKey) -> (Arc<TenantSlot>, bool) {
        if let Some(slot) = self.slots.get(key) {
            return (Arc::clone(slot.value()), false);
        }
        let mut created = false;
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(TenantSlot::new(key.clone()))
            })
            .value()
            .clone();
        (slot, created)
    }

    pub fn get(&self, key: &TenantKey) -> Option<Arc<TenantSlot>> {
        self.slots.get(key).map(|s| Arc::clone(s.value()))
    }

    pub fn keys(&self) -> Vec<TenantKey> {
        let mut keys: Vec<TenantKey> = self.slots.iter().map(|s| s.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
