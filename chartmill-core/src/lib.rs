//! Core data types for the chartmill chart repository server.
//!
//! Everything in this crate is pure: object descriptors and the diff used to
//! decide whether a tenant's index needs rebuilding, the index document
//! itself, tenant keys, configuration and the error taxonomy. Storage access
//! lives in `chartmill-storage`; coordination and HTTP live in
//! `chartmill-api`.

pub mod config;
pub mod error;
pub mod index;
pub mod object;
pub mod tenant;

pub use config::{ServerConfig, StorageKind};
pub use error::{
    ChartmillError, ChartmillResult, ConfigError, IndexError, ParseError, StorageError,
};
pub use index::{ChartMetadata, ChartVersion, IndexFile, INDEX_API_VERSION};
pub use object::{ChartRef, ObjectDescriptor, ObjectSliceDiff, CHART_PACKAGE_EXTENSION};
pub use tenant::TenantKey;

/// Name of the per-tenant statefile holding a serialized index snapshot.
pub const STATEFILE_NAME: &str = "index-cache.yaml";
