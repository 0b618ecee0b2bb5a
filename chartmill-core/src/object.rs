//! Storage object descriptors and the object slice diff.
//!
//! A tenant's index is derived from the list of chart packages stored under
//! its prefix. Rebuilding that index is expensive, so every refresh first
//! compares the cached object list with a fresh listing and only rebuilds
//! when something actually moved.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// File extension of chart packages.
pub const CHART_PACKAGE_EXTENSION: &str = ".tgz";

// ============================================================================
// OBJECT DESCRIPTOR
// ============================================================================

/// Name and version of the chart a stored package was parsed into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartRef {
    pub name: String,
    pub version: String,
}

impl ChartRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Canonical package filename, `<name>-<version>.tgz`.
    pub fn package_filename(&self) -> String {
        format!("{}-{}{}", self.name, self.version, CHART_PACKAGE_EXTENSION)
    }
}

/// One object in a storage backend, relative to the tenant prefix it was
/// listed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Chart this object was parsed into. `None` for freshly listed objects
    /// and for packages that failed to parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartRef>,
}

impl ObjectDescriptor {
    pub fn new(path: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size,
            last_modified,
            chart: None,
        }
    }

    pub fn with_chart(mut self, chart: ChartRef) -> Self {
        self.chart = Some(chart);
        self
    }

    /// Whether this object is a chart package directly under the tenant
    /// prefix. Nested paths belong to deeper tenants.
    pub fn is_chart_package(&self) -> bool {
        !self.path.contains('/') && self.path.ends_with(CHART_PACKAGE_EXTENSION)
    }
}

// ============================================================================
// OBJECT SLICE DIFF
// ============================================================================

/// Difference between a cached object list and a fresh listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSliceDiff {
    pub changed: bool,
    pub added: Vec<ObjectDescriptor>,
    pub removed: Vec<ObjectDescriptor>,
    /// Objects present in both lists whose timestamps moved by more than the
    /// tolerance. Holds the fresh descriptor.
    pub updated: Vec<ObjectDescriptor>,
}

impl ObjectSliceDiff {
    /// Compare `prev` against `curr`, keyed by path.
    ///
    /// An object present in both counts as updated only when its
    /// last-modified timestamp differs by strictly more than `tolerance`.
    pub fn compute(
        prev: &[ObjectDescriptor],
        curr: &[ObjectDescriptor],
        tolerance: Duration,
    ) -> Self {
        let tolerance = TimeDelta::from_std(tolerance).unwrap_or(TimeDelta::MAX);

        let prev_by_path: HashMap<&str, &ObjectDescriptor> =
            prev.iter().map(|o| (o.path.as_str(), o)).collect();
        let curr_by_path: HashMap<&str, &ObjectDescriptor> =
            curr.iter().map(|o| (o.path.as_str(), o)).collect();

        let mut diff = ObjectSliceDiff::default();

        for object in curr {
            match prev_by_path.get(object.path.as_str()) {
                None => diff.added.push(object.clone()),
                Some(cached) => {
                    let delta = (object.last_modified - cached.last_modified).abs();
                    if delta > tolerance {
                        diff.updated.push(object.clone());
                    }
                }
            }
        }

        for object in prev {
            if !curr_by_path.contains_key(object.path.as_str()) {
                diff.removed.push(object.clone());
            }
        }

        diff.changed =
            !diff.added.is_empty() || !diff.removed.is_empty() || !diff.updated.is_empty();
        diff
    }

    /// Total number of objects that need work.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
