//! The storage backend contract.

use async_trait::async_trait;
use chartmill_core::{ObjectDescriptor, StorageError};
use chrono::{DateTime, Utc};

/// A fetched object with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub content: Vec<u8>,
    pub content_type: &'static str,
    pub last_modified: DateTime<Utc>,
}

/// Object storage used to hold chart packages and statefiles.
///
/// Implementations must be safe to call from many tasks at once. No retry
/// is expected of callers; a backend that wants retries does them itself.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// List every object below `prefix`, recursively. Returned paths are
    /// relative to the prefix. A prefix with nothing under it yields an
    /// empty list rather than an error.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, StorageError>;

    /// Fetch one object.
    async fn get_object(&self, path: &str) -> Result<StoredObject, StorageError>;

    /// Create or replace an object.
    async fn put_object(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    /// Delete an object. Deleting a missing object is `NotFound`.
    async fn delete_object(&self, path: &str) -> Result<(), StorageError>;

    /// Whether an object exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match self.get_object(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Content type served for a stored object, by extension.
pub fn content_type_for(path: &str) -> &'static str {
    if path.ends_with(".tgz") || path.ends_with(".tar.gz") {
        "application/x-tar"
    } else if path.ends_with(".prov") {
        "application/pgp-signature"
    } else if path.ends_with(".yaml") || path.ends_with(".yml") {
        "application/x-yaml"
    } else {
        "application/octet-stream"
    }
}

/// Reject absolute paths and traversal segments.
pub(crate) fn validate_path(path: &str) -> Result<(), StorageError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|s| s.is_empty() || s == "." || s == "..");
    if bad {
        Err(StorageError::InvalidPath {
            path: path.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Normalize a listing prefix: no leading or trailing slash.
pub(crate) fn normalize_prefix(prefix: &str) -> Result<String, StorageError> {
    let trimmed = prefix.trim_matches('/');
    if !trimmed.is_empty() {
        validate_path(trimmed)?;
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a-0.1.0.tgz"), "application/x-tar");
        assert_eq!(content_type_for("a-0.1.0.tgz.prov"), "application/pgp-signature");
        assert_eq!(content_type_for("index-cache.yaml"), "application/x-yaml");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("org/repo/a.tgz").is_ok());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("org/../x").is_err());
        assert!(validate_path("org//x").is_err());
        assert!(validate_path("").is_err());
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("").unwrap(), "");
        assert_eq!(normalize_prefix("/org/repo/").unwrap(), "org/repo");
        assert!(normalize_prefix("org/..").is_err());
    }
}
