//! Error types for chartmill operations

use thiserror::Error;

/// Storage backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Object not found: {path}")]
    NotFound { path: String },

    #[error("Storage I/O failed for {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid object path: {path}")]
    InvalidPath { path: String },
}

impl StorageError {
    /// Whether this error means the object is simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Chart package parse errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Package is not a gzip stream: {reason}")]
    NotGzip { reason: String },

    #[error("Package archive is unreadable: {reason}")]
    InvalidArchive { reason: String },

    #[error("Package does not contain a Chart.yaml")]
    MissingChartYaml,

    #[error("Chart.yaml is invalid: {reason}")]
    InvalidChartYaml { reason: String },

    #[error("Chart.yaml is missing required field: {field}")]
    MissingField { field: String },
}

/// Index cache and coordination errors.
///
/// These are `Clone` so one worker outcome can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("Storage backend failed for tenant '{tenant}': {reason}")]
    Backend { tenant: String, reason: String },

    #[error("{operation} worker panicked for tenant '{tenant}'")]
    WorkerPanicked { tenant: String, operation: String },

    #[error("{operation} worker for tenant '{tenant}' exited without a result")]
    WorkerLost { tenant: String, operation: String },

    #[error("Index build limiter is closed")]
    LimiterClosed,

    #[error("Statefile for tenant '{tenant}' failed: {reason}")]
    Statefile { tenant: String, reason: String },

    #[error("Index serialization failed: {reason}")]
    Serialization { reason: String },
}

impl IndexError {
    /// Wrap a storage failure with the tenant it happened for.
    pub fn backend(tenant: impl Into<String>, err: &StorageError) -> Self {
        IndexError::Backend {
            tenant: tenant.into(),
            reason: err.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },
}

/// Master error type for all chartmill errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChartmillError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for chartmill operations.
pub type ChartmillResult<T> = Result<T, ChartmillError>;
