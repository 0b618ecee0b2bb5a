//! Server configuration

use crate::{ChartmillError, ChartmillResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which storage backend to serve charts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

impl std::str::FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "memory" => Ok(StorageKind::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "storage".to_string(),
                value: other.to_string(),
                reason: "expected 'local' or 'memory'".to_string(),
            }),
        }
    }
}

/// Configuration for the chart repository server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// URL prefix the router strips before matching. Empty, or starts with
    /// `/` and does not end with one.
    pub context_path: String,
    /// Number of path segments that name a tenant.
    pub depth: usize,
    /// Infer the tenant depth per request instead of using `depth`.
    pub depth_dynamic: bool,
    /// Timestamp jitter ignored when diffing object lists.
    pub timestamp_tolerance: Duration,
    /// Maximum versions kept in one tenant's index. Zero means unbounded.
    pub max_storage_objects: usize,
    /// Parallel index builds allowed server-wide. Zero means one per CPU.
    pub index_limit: usize,
    pub use_statefiles: bool,
    /// Background refresh period. Zero disables the timer.
    pub cache_interval: Duration,
    /// Absolute base for download URLs in the index.
    pub chart_url: Option<String>,
    pub storage: StorageKind,
    pub storage_local_rootdir: Option<PathBuf>,
    pub allow_overwrite: bool,
    pub disable_metrics: bool,
    pub log_json: bool,
    pub log_health: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            context_path: String::new(),
            depth: 0,
            depth_dynamic: false,
            timestamp_tolerance: Duration::ZERO,
            max_storage_objects: 0,
            index_limit: 0,
            use_statefiles: true,
            cache_interval: Duration::ZERO,
            chart_url: None,
            storage: StorageKind::Memory,
            storage_local_rootdir: None,
            allow_overwrite: false,
            disable_metrics: false,
            log_json: false,
            log_health: false,
        }
    }
}

impl ServerConfig {
    /// Create ServerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `CHARTMILL_BIND`, `CHARTMILL_PORT` (falls back to `PORT`)
    /// - `CHARTMILL_CONTEXT_PATH`
    /// - `CHARTMILL_DEPTH`, `CHARTMILL_DEPTH_DYNAMIC`
    /// - `CHARTMILL_STORAGE_TIMESTAMP_TOLERANCE_MS`
    /// - `CHARTMILL_MAX_STORAGE_OBJECTS`, `CHARTMILL_INDEX_LIMIT`
    /// - `CHARTMILL_DISABLE_STATEFILES`
    /// - `CHARTMILL_CACHE_INTERVAL_SECS`
    /// - `CHARTMILL_CHART_URL`
    /// - `CHARTMILL_STORAGE` (`local` or `memory`), `CHARTMILL_STORAGE_LOCAL_ROOTDIR`
    /// - `CHARTMILL_ALLOW_OVERWRITE`, `CHARTMILL_DISABLE_METRICS`
    /// - `CHARTMILL_LOG_JSON`, `CHARTMILL_LOG_HEALTH`
    ///
    /// Unparseable numbers fall back to defaults. An unknown storage kind is
    /// an error.
    pub fn from_env() -> ChartmillResult<Self> {
        let defaults = Self::default();

        let storage_local_rootdir = std::env::var("CHARTMILL_STORAGE_LOCAL_ROOTDIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let storage = match std::env::var("CHARTMILL_STORAGE") {
            Ok(raw) => raw.parse()?,
            Err(_) if storage_local_rootdir.is_some() => StorageKind::Local,
            Err(_) => defaults.storage,
        };

        Ok(Self {
            bind: std::env::var("CHARTMILL_BIND").unwrap_or(defaults.bind),
            port: env_parse("CHARTMILL_PORT")
                .or_else(|| env_parse("PORT"))
                .unwrap_or(defaults.port),
            context_path: std::env::var("CHARTMILL_CONTEXT_PATH").unwrap_or_default(),
            depth: env_parse("CHARTMILL_DEPTH").unwrap_or(defaults.depth),
            depth_dynamic: env_flag("CHARTMILL_DEPTH_DYNAMIC"),
            timestamp_tolerance: env_parse("CHARTMILL_STORAGE_TIMESTAMP_TOLERANCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.timestamp_tolerance),
            max_storage_objects: env_parse("CHARTMILL_MAX_STORAGE_OBJECTS")
                .unwrap_or(defaults.max_storage_objects),
            index_limit: env_parse("CHARTMILL_INDEX_LIMIT").unwrap_or(defaults.index_limit),
            use_statefiles: !env_flag("CHARTMILL_DISABLE_STATEFILES"),
            cache_interval: env_parse("CHARTMILL_CACHE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_interval),
            chart_url: std::env::var("CHARTMILL_CHART_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            storage,
            storage_local_rootdir,
            allow_overwrite: env_flag("CHARTMILL_ALLOW_OVERWRITE"),
            disable_metrics: env_flag("CHARTMILL_DISABLE_METRICS"),
            log_json: env_flag("CHARTMILL_LOG_JSON"),
            log_health: env_flag("CHARTMILL_LOG_HEALTH"),
        })
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_dynamic_depth(mut self, dynamic: bool) -> Self {
        self.depth_dynamic = dynamic;
        self
    }

    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    pub fn with_timestamp_tolerance(mut self, tolerance: Duration) -> Self {
        self.timestamp_tolerance = tolerance;
        self
    }

    pub fn with_max_storage_objects(mut self, max: usize) -> Self {
        self.max_storage_objects = max;
        self
    }

    pub fn with_index_limit(mut self, limit: usize) -> Self {
        self.index_limit = limit;
        self
    }

    pub fn with_statefiles(mut self, enabled: bool) -> Self {
        self.use_statefiles = enabled;
        self
    }

    pub fn with_cache_interval(mut self, interval: Duration) -> Self {
        self.cache_interval = interval;
        self
    }

    pub fn with_chart_url(mut self, chart_url: impl Into<String>) -> Self {
        self.chart_url = Some(chart_url.into());
        self
    }

    pub fn with_local_storage(mut self, rootdir: impl Into<PathBuf>) -> Self {
        self.storage = StorageKind::Local;
        self.storage_local_rootdir = Some(rootdir.into());
        self
    }

    pub fn with_allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    /// Index build parallelism with the CPU-count default applied.
    pub fn effective_index_limit(&self) -> usize {
        if self.index_limit == 0 {
            num_cpus::get().max(1)
        } else {
            self.index_limit
        }
    }

    /// Base URL for chart downloads, including the context path, without a
    /// trailing slash. `None` means download URLs are relative.
    pub fn chart_base_url(&self) -> Option<String> {
        self.chart_url.as_ref().map(|url| {
            format!("{}{}", url.trim_end_matches('/'), self.context_path)
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ChartmillResult<()> {
        if !self.context_path.is_empty()
            && (!self.context_path.starts_with('/') || self.context_path.ends_with('/'))
        {
            return Err(invalid(
                "context_path",
                &self.context_path,
                "context_path must start with '/' and must not end with '/'",
            ));
        }

        if let Some(url) = &self.chart_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    "chart_url",
                    url,
                    "chart_url must be an absolute http(s) URL",
                ));
            }
        }

        if self.storage == StorageKind::Local && self.storage_local_rootdir.is_none() {
            return Err(ChartmillError::Config(ConfigError::Missing {
                field: "storage_local_rootdir".to_string(),
            }));
        }

        if self.port == 0 {
            return Err(invalid("port", "0", "port must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ChartmillError {
    ChartmillError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_context_path_validation() {
        assert!(ServerConfig::default().with_context_path("/x/y").validate().is_ok());
        assert!(ServerConfig::default().with_context_path("x").validate().is_err());
        assert!(ServerConfig::default().with_context_path("/x/").validate().is_err());
    }

    #[test]
    fn test_local_storage_requires_rootdir() {
        let mut config = ServerConfig::default();
        config.storage = StorageKind::Local;
        assert!(matches!(
            config.validate(),
            Err(ChartmillError::Config(ConfigError::Missing { .. }))
        ));
        assert!(config.with_local_storage("/tmp/charts").validate().is_ok());
    }

    #[test]
    fn test_chart_url_validation_and_base() {
        let config = ServerConfig::default()
            .with_chart_url("https://charts.example.com/")
            .with_context_path("/x");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.chart_base_url().as_deref(),
            Some("https://charts.example.com/x")
        );
        assert!(ServerConfig::default()
            .with_chart_url("charts.example.com")
            .validate()
            .is_err());
    }

    #[test]
    fn test_effective_index_limit() {
        assert!(ServerConfig::default().effective_index_limit() >= 1);
        assert_eq!(ServerConfig::default().with_index_limit(3).effective_index_limit(), 3);
    }

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("LOCAL".parse::<StorageKind>().unwrap(), StorageKind::Local);
        assert!("s3".parse::<StorageKind>().is_err());
    }
}
