//! chartmill Storage - Backend Contract and Implementations
//!
//! Chart packages live in an object store addressed by `/`-separated paths.
//! The cache layer only needs four operations from it, captured by
//! [`StorageBackend`]. Two implementations ship here: a local filesystem
//! backend for real deployments and an in-memory one for tests and
//! ephemeral servers.
//!
//! The package-format contract ([`ChartParser`]) lives here too since it is
//! the other half of turning stored bytes into index entries.

pub mod backend;
pub mod chart;
pub mod local;
pub mod memory;

pub use backend::{content_type_for, StorageBackend, StoredObject};
pub use chart::{ChartParser, TarballChartParser};
pub use local::LocalFilesystemBackend;
pub use memory::InMemoryBackend;
