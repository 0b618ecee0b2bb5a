//! chartmill Test Utilities
//!
//! Shared test infrastructure for the chartmill workspace:
//! - Fixtures that build chart packages in memory
//! - Proptest generators for object descriptors and tenant paths
//! - An instrumented storage backend that counts, delays, fails or panics

pub use chartmill_core::{
    ChartMetadata, ChartRef, ChartVersion, IndexFile, ObjectDescriptor, ObjectSliceDiff,
    ServerConfig, StorageError, TenantKey,
};
pub use chartmill_storage::{InMemoryBackend, StorageBackend, StoredObject};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};
    use flate2::write::GzEncoder;
    use flate2::Compression;

    /// A fixed point in time, `secs` seconds after 2023-11-14T22:13:20Z.
    pub fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Build a gzipped tarball containing `<name>/Chart.yaml`.
    pub fn chart_package(name: &str, version: &str) -> Vec<u8> {
        chart_package_with(name, version, "")
    }

    /// Like [`chart_package`] with extra `Chart.yaml` lines appended.
    pub fn chart_package_with(name: &str, version: &str, extra_yaml: &str) -> Vec<u8> {
        let chart_yaml = format!(
            "apiVersion: v2\nname: {name}\nversion: {version}\ndescription: A test chart\n{extra_yaml}"
        );
        let values = "replicaCount: 1\n";
        tarball(&[
            (format!("{name}/Chart.yaml"), chart_yaml),
            (format!("{name}/values.yaml"), values.to_string()),
        ])
    }

    /// Bytes that look like a package by name only.
    pub fn corrupt_package() -> Vec<u8> {
        b"this is definitely not a gzip stream".to_vec()
    }

    /// A valid gzip tarball with no `Chart.yaml`.
    pub fn package_without_chart_yaml() -> Vec<u8> {
        tarball(&[("mychart/values.yaml".to_string(), "a: b\n".to_string())])
    }

    /// Canonical package filename.
    pub fn package_name(name: &str, version: &str) -> String {
        format!("{name}-{version}.tgz")
    }

    fn tarball(files: &[(String, String)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, body) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, body.as_bytes())
                .expect("append tar entry");
        }
        builder
            .into_inner()
            .and_then(|gz| gz.finish())
            .expect("finish tarball")
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use super::fixtures::ts;
    use chartmill_core::ObjectDescriptor;
    use proptest::prelude::*;

    /// One tenant path segment that never collides with a route literal.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,7}".prop_filter("reserved route literal", |s| {
            !matches!(s.as_str(), "charts" | "health" | "api" | "index")
        })
    }

    /// Tenant path segments of the given depth.
    pub fn arb_tenant_segments(depth: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_segment(), depth..=depth)
    }

    /// A chart package descriptor at the tenant root.
    pub fn arb_object_descriptor() -> impl Strategy<Value = ObjectDescriptor> {
        ("[a-z]{1,8}", 0u32..5, 0u32..20, 0i64..100_000).prop_map(
            |(name, major, minor, secs)| {
                ObjectDescriptor::new(format!("{name}-{major}.{minor}.0.tgz"), 1024, ts(secs))
            },
        )
    }

    /// A list of descriptors with unique paths.
    pub fn arb_object_list(max: usize) -> impl Strategy<Value = Vec<ObjectDescriptor>> {
        prop::collection::vec(arb_object_descriptor(), 0..max).prop_map(|mut objects| {
            objects.sort_by(|a, b| a.path.cmp(&b.path));
            objects.dedup_by(|a, b| a.path == b.path);
            objects
        })
    }
}

// ============================================================================
// INSTRUMENTED BACKEND
// ============================================================================

/// An in-memory backend that records calls and can be made slow, failing
/// or panicking on listing.
#[derive(Debug)]
pub struct InstrumentedBackend {
    inner: InMemoryBackend,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
    fail_lists: AtomicBool,
    panic_lists: AtomicUsize,
    gate_enabled: AtomicBool,
    gate: Semaphore,
}

impl Default for InstrumentedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentedBackend {
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            fail_lists: AtomicBool::new(false),
            panic_lists: AtomicUsize::new(0),
            gate_enabled: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Direct access to the underlying store, bypassing the counters.
    pub fn store(&self) -> &InMemoryBackend {
        &self.inner
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Make every listing fail until turned off.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Panic inside the next `count` listings.
    pub fn panic_next_lists(&self, count: usize) {
        self.panic_lists.store(count, Ordering::SeqCst);
    }

    /// Block listings until [`release_lists`](Self::release_lists) is called.
    pub fn hold_lists(&self) {
        self.gate_enabled.store(true, Ordering::SeqCst);
    }

    /// Let `count` held listings proceed and stop holding new ones.
    pub fn release_lists(&self, count: usize) {
        self.gate_enabled.store(false, Ordering::SeqCst);
        self.gate.add_permits(count);
    }
}

#[async_trait]
impl StorageBackend for InstrumentedBackend {
    fn name(&self) -> &'static str {
        "instrumented"
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if self.gate_enabled.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        let should_panic = self
            .panic_lists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_panic {
            panic!("instrumented backend panicked while listing '{prefix}'");
        }

        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: prefix.to_string(),
                reason: "injected listing failure".to_string(),
            });
        }
        self.inner.list_objects(prefix).await
    }

    async fn get_object(&self, path: &str) -> Result<StoredObject, StorageError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_object(path).await
    }

    async fn put_object(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.put_object(path, content).await
    }

    async fn delete_object(&self, path: &str) -> Result<(), StorageError> {
        self.inner.delete_object(path).await
    }
}
