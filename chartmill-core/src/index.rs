//! The repository index document served as `index.yaml`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::IndexError;
use crate::object::{ChartRef, ObjectDescriptor};

/// `apiVersion` written into every index document.
pub const INDEX_API_VERSION: &str = "v1";

/// Metadata read from a package's `Chart.yaml`.
///
/// Only `name` and `version` are interpreted; every other field is carried
/// through to the index untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ChartMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn chart_ref(&self) -> ChartRef {
        ChartRef::new(self.name.clone(), self.version.clone())
    }
}

/// One version entry in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartVersion {
    #[serde(flatten)]
    pub metadata: ChartMetadata,
    #[serde(default)]
    pub urls: Vec<String>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub digest: String,
}

impl ChartVersion {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Descriptor of the stored package this entry was built from.
    ///
    /// Used to rebuild a cached object list from a statefile; `created` is
    /// always the package's last-modified time.
    pub fn to_object(&self) -> ObjectDescriptor {
        let chart = self.metadata.chart_ref();
        ObjectDescriptor::new(chart.package_filename(), 0, self.created).with_chart(chart)
    }
}

/// A tenant's generated index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFile {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
    pub generated: DateTime<Utc>,
}

impl Default for IndexFile {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexFile {
    pub fn new() -> Self {
        Self {
            api_version: INDEX_API_VERSION.to_string(),
            entries: BTreeMap::new(),
            generated: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of version records across all charts.
    pub fn version_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&ChartVersion> {
        self.entries
            .get(name)?
            .iter()
            .find(|v| v.version() == version)
    }

    /// Insert a version, replacing any record with the same name and version.
    pub fn upsert(&mut self, record: ChartVersion) {
        let versions = self.entries.entry(record.name().to_string()).or_default();
        versions.retain(|v| v.version() != record.version());
        versions.push(record);
        sort_newest_first(versions);
    }

    /// Remove a version. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str, version: &str) -> bool {
        let Some(versions) = self.entries.get_mut(name) else {
            return false;
        };
        let before = versions.len();
        versions.retain(|v| v.version() != version);
        let removed = versions.len() != before;
        if versions.is_empty() {
            self.entries.remove(name);
        }
        removed
    }

    /// Keep only the `max` most recently created versions across all charts.
    /// Zero means unbounded. Returns the records that were dropped.
    pub fn retain_newest(&mut self, max: usize) -> Vec<ChartRef> {
        if max == 0 || self.version_count() <= max {
            return Vec::new();
        }

        let mut all: Vec<(DateTime<Utc>, ChartRef)> = self
            .entries
            .values()
            .flatten()
            .map(|v| (v.created, v.metadata.chart_ref()))
            .collect();
        all.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));

        let dropped: Vec<ChartRef> = all.into_iter().skip(max).map(|(_, r)| r).collect();
        for chart in &dropped {
            self.remove(&chart.name, &chart.version);
        }
        dropped
    }

    /// Rebuild the object list this index was generated from.
    pub fn objects(&self) -> Vec<ObjectDescriptor> {
        self.entries
            .values()
            .flatten()
            .map(ChartVersion::to_object)
            .collect()
    }

    pub fn to_yaml(&self) -> Result<String, IndexError> {
        serde_yaml::to_string(self).map_err(|e| IndexError::Serialization {
            reason: e.to_string(),
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, IndexError> {
        serde_yaml::from_str(raw).map_err(|e| IndexError::Serialization {
            reason: e.to_string(),
        })
    }
}

fn sort_newest_first(versions: &mut [ChartVersion]) {
    versions.sort_by(|a, b| {
        b.created
            .cmp(&a.created)
            .then_with(|| b.version().cmp(a.version()))
    });
}
