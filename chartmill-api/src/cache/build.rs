//! The regeneration worker body.

use chartmill_core::{
    ChartRef, ChartVersion, IndexError, ObjectDescriptor, ObjectSliceDiff, TenantKey,
    STATEFILE_NAME,
};
use chartmill_storage::{ChartParser, StorageBackend};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use super::registry::{CacheEntry, TenantSlot};
use super::{CacheSettings, Regenerated};
use crate::telemetry::metrics;

/// Applies an object diff to a tenant's cached index.
pub struct IndexBuilder {
    storage: Arc<dyn StorageBackend>,
    parser: Arc<dyn ChartParser>,
    settings: CacheSettings,
}

impl IndexBuilder {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        parser: Arc<dyn ChartParser>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            storage,
            parser,
            settings,
        }
    }

    /// Bring the slot's entry in line with `fetched`.
    ///
    /// Must only be called from the slot's regeneration flight. The diff is
    /// recomputed against the entry as it is now, so callers that computed
    /// theirs before an earlier regeneration landed cannot apply stale work.
    /// On error the entry is left untouched.
    pub async fn run(
        &self,
        slot: &TenantSlot,
        fetched: &[ObjectDescriptor],
    ) -> Result<Regenerated, IndexError> {
        let key = slot.key();
        let current = slot.entry();
        let diff = ObjectSliceDiff::compute(
            &current.objects,
            fetched,
            self.settings.timestamp_tolerance,
        );
        if !diff.changed {
            return Ok(Regenerated {
                index: current.index,
                changed: false,
            });
        }

        tracing::info!(
            tenant = %key,
            added = diff.added.len(),
            removed = diff.removed.len(),
            updated = diff.updated.len(),
            "Regenerating index"
        );

        let cached_charts: HashMap<&str, &ChartRef> = current
            .objects
            .iter()
            .filter_map(|o| o.chart.as_ref().map(|c| (o.path.as_str(), c)))
            .collect();

        let mut versions = (*current.versions).clone();

        for object in diff.removed.iter().chain(diff.updated.iter()) {
            if let Some(chart) = cached_charts.get(object.path.as_str()) {
                versions.remove(&chart.name, &chart.version);
            }
        }

        // Unchanged objects keep what we already know about them.
        let mut objects: Vec<ObjectDescriptor> = fetched
            .iter()
            .map(|o| {
                let mut o = o.clone();
                o.chart = cached_charts.get(o.path.as_str()).map(|c| (*c).clone());
                o
            })
            .collect();
        let position: HashMap<String, usize> = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.path.clone(), i))
            .collect();

        for object in diff.added.iter().chain(diff.updated.iter()) {
            let Some(&at) = position.get(&object.path) else {
                continue;
            };
            objects[at].chart = None;
            if let Some(record) = self.load_version(key, object).await? {
                objects[at].chart = Some(record.metadata.chart_ref());
                versions.upsert(record);
            }
        }

        versions.generated = Utc::now();
        let mut index = versions.clone();
        let dropped = index.retain_newest(self.settings.max_objects);
        if !dropped.is_empty() {
            tracing::debug!(
                tenant = %key,
                dropped = dropped.len(),
                max_objects = self.settings.max_objects,
                "Dropped oldest versions over the object limit"
            );
        }

        if self.settings.use_statefiles {
            self.write_statefile(key, &index).await;
        }

        let index = Arc::new(index);
        slot.replace_entry(CacheEntry {
            objects: Arc::new(objects),
            versions: Arc::new(versions),
            index: Arc::clone(&index),
            populated: true,
        });

        Ok(Regenerated {
            index,
            changed: true,
        })
    }

    /// Fetch and parse one package. `Ok(None)` means the object should be
    /// left out of the index: it vanished since listing or is malformed.
    async fn load_version(
        &self,
        key: &TenantKey,
        object: &ObjectDescriptor,
    ) -> Result<Option<ChartVersion>, IndexError> {
        let path = key.object_path(&object.path);
        let stored = match self.storage.get_object(&path).await {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => {
                tracing::debug!(tenant = %key, path = %object.path, "Object vanished before it could be read");
                return Ok(None);
            }
            Err(e) => return Err(IndexError::backend(key.as_str(), &e)),
        };

        let metadata = match self.parser.parse_metadata(&stored.content) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(
                    tenant = %key,
                    path = %object.path,
                    error = %e,
                    "Skipping chart package that failed to parse"
                );
                if let Ok(m) = metrics() {
                    m.record_parse_failure();
                }
                return Ok(None);
            }
        };

        Ok(Some(ChartVersion {
            metadata,
            urls: vec![self.download_url(key, &object.path)],
            created: object.last_modified,
            digest: hex::encode(Sha256::digest(&stored.content)),
        }))
    }

    fn download_url(&self, key: &TenantKey, filename: &str) -> String {
        match &self.settings.chart_base_url {
            Some(base) if key.is_root() => format!("{base}/charts/{filename}"),
            Some(base) => format!("{base}/{key}/charts/{filename}"),
            None => format!("charts/{filename}"),
        }
    }

    async fn write_statefile(&self, key: &TenantKey, index: &chartmill_core::IndexFile) {
        let path = key.object_path(STATEFILE_NAME);
        let result = match index.to_yaml() {
            Ok(raw) => self
                .storage
                .put_object(&path, raw.as_bytes())
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = result {
            tracing::warn!(tenant = %key, error = %reason, "Failed to write statefile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartmill_storage::{InMemoryBackend, TarballChartParser};
    use chartmill_test_utils::fixtures::{chart_package, corrupt_package, ts};

    fn builder(storage: Arc<InMemoryBackend>, settings: CacheSettings) -> IndexBuilder {
        IndexBuilder::new(storage, Arc::new(TarballChartParser::new()), settings)
    }

    fn settings() -> CacheSettings {
        CacheSettings {
            use_statefiles: false,
            ..CacheSettings::default()
        }
    }

    #[tokio::test]
    async fn test_builds_entries_with_digest_and_relative_url() {
        let storage = Arc::new(InMemoryBackend::new());
        let package = chart_package("mychart", "0.1.0");
        storage
            .put_object_at("myrepo/mychart-0.1.0.tgz", &package, ts(10))
            .unwrap();
        let slot = TenantSlot::new(TenantKey::parse("myrepo").unwrap());
        let fetched = vec![ObjectDescriptor::new("mychart-0.1.0.tgz", package.len() as u64, ts(10))];

        let out = builder(Arc::clone(&storage), settings())
            .run(&slot, &fetched)
            .await
            .unwrap();

        assert!(out.changed);
        let record = out.index.get("mychart", "0.1.0").unwrap();
        assert_eq!(record.urls, vec!["charts/mychart-0.1.0.tgz".to_string()]);
        assert_eq!(record.created, ts(10));
        assert_eq!(record.digest, hex::encode(Sha256::digest(&package)));
        assert_eq!(
            slot.entry().objects[0].chart,
            Some(ChartRef::new("mychart", "0.1.0"))
        );
    }

    #[tokio::test]
    async fn test_absolute_url_uses_tenant_path() {
        let storage = Arc::new(InMemoryBackend::new());
        storage
            .put_object_at("org/repo/a-1.0.0.tgz", &chart_package("a", "1.0.0"), ts(0))
            .unwrap();
        let slot = TenantSlot::new(TenantKey::parse("org/repo").unwrap());
        let settings = CacheSettings {
            chart_base_url: Some("https://charts.example.com/x".to_string()),
            ..settings()
        };

        let out = builder(storage, settings)
            .run(&slot, &[ObjectDescriptor::new("a-1.0.0.tgz", 1, ts(0))])
            .await
            .unwrap();
        assert_eq!(
            out.index.get("a", "1.0.0").unwrap().urls[0],
            "https://charts.example.com/x/org/repo/charts/a-1.0.0.tgz"
        );
    }

    #[tokio::test]
    async fn test_removed_object_drops_entry() {
        let storage = Arc::new(InMemoryBackend::new());
        storage
            .put_object_at("a-1.0.0.tgz", &chart_package("a", "1.0.0"), ts(0))
            .unwrap();
        let slot = TenantSlot::new(TenantKey::root());
        let b = builder(storage, settings());

        b.run(&slot, &[ObjectDescriptor::new("a-1.0.0.tgz", 1, ts(0))])
            .await
            .unwrap();
        let out = b.run(&slot, &[]).await.unwrap();
        assert!(out.changed);
        assert!(out.index.is_empty());
        assert!(slot.entry().objects.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_package_is_skipped_but_remembered() {
        let storage = Arc::new(InMemoryBackend::new());
        storage
            .put_object_at("good-1.0.0.tgz", &chart_package("good", "1.0.0"), ts(0))
            .unwrap();
        storage.put_object_at("bad-1.0.0.tgz", &corrupt_package(), ts(0)).unwrap();
        let slot = TenantSlot::new(TenantKey::root());
        let fetched = vec![
            ObjectDescriptor::new("bad-1.0.0.tgz", 1, ts(0)),
            ObjectDescriptor::new("good-1.0.0.tgz", 1, ts(0)),
        ];
        let b = builder(storage, settings());

        let out = b.run(&slot, &fetched).await.unwrap();
        assert_eq!(out.index.version_count(), 1);
        assert!(out.index.get("good", "1.0.0").is_some());
        assert_eq!(slot.entry().objects.len(), 2);

        let again = b.run(&slot, &fetched).await.unwrap();
        assert!(!again.changed);
    }

    #[tokio::test]
    async fn test_version_over_limit_returns_when_newer_is_removed() {
        let storage = Arc::new(InMemoryBackend::new());
        storage
            .put_object_at("a-1.0.0.tgz", &chart_package("a", "1.0.0"), ts(0))
            .unwrap();
        storage
            .put_object_at("b-1.0.0.tgz", &chart_package("b", "1.0.0"), ts(60))
            .unwrap();
        let slot = TenantSlot::new(TenantKey::root());
        let settings = CacheSettings {
            max_objects: 1,
            ..settings()
        };
        let b = builder(storage, settings);
        let a = ObjectDescriptor::new("a-1.0.0.tgz", 1, ts(0));

        let out = b
            .run(&slot, &[a.clone(), ObjectDescriptor::new("b-1.0.0.tgz", 1, ts(60))])
            .await
            .unwrap();
        assert!(out.index.get("a", "1.0.0").is_none());
        assert_eq!(slot.entry().versions.version_count(), 2);

        let out = b.run(&slot, &[a]).await.unwrap();
        assert!(out.changed);
        assert_eq!(out.index.version_count(), 1);
        assert!(out.index.get("a", "1.0.0").is_some());
    }

    #[tokio::test]
    async fn test_statefile_written_after_regeneration() {
        let storage = Arc::new(InMemoryBackend::new());
        storage
            .put_object_at("team/a-1.0.0.tgz", &chart_package("a", "1.0.0"), ts(0))
            .unwrap();
        let slot = TenantSlot::new(TenantKey::parse("team").unwrap());
        let settings = CacheSettings {
            use_statefiles: true,
            ..settings()
        };

        builder(Arc::clone(&storage), settings)
            .run(&slot, &[ObjectDescriptor::new("a-1.0.0.tgz", 1, ts(0))])
            .await
            .unwrap();

        let stored = storage.get_object("team/index-cache.yaml").await.unwrap();
        let index =
            chartmill_core::IndexFile::from_yaml(&String::from_utf8(stored.content).unwrap())
                .unwrap();
        assert!(index.get("a", "1.0.0").is_some());
    }
}
