//! In-memory backend.

use async_trait::async_trait;
use chartmill_core::{ObjectDescriptor, StorageError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::backend::{content_type_for, normalize_prefix, validate_path, StorageBackend, StoredObject};

#[derive(Debug, Clone)]
struct MemoryObject {
    content: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Storage backend holding every object in a map.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit last-modified time.
    pub fn put_object_at(
        &self,
        path: &str,
        content: &[u8],
        last_modified: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        validate_path(path)?;
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            path.to_string(),
            MemoryObject {
                content: content.to_vec(),
                last_modified,
            },
        );
        Ok(())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, StorageError> {
        let prefix = normalize_prefix(prefix)?;
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());

        let listed = objects
            .iter()
            .filter_map(|(path, object)| {
                let rel = if prefix.is_empty() {
                    path.as_str()
                } else {
                    path.strip_prefix(prefix.as_str())?.strip_prefix('/')?
                };
                Some(ObjectDescriptor::new(
                    rel,
                    object.content.len() as u64,
                    object.last_modified,
                ))
            })
            .collect();
        Ok(listed)
    }

    async fn get_object(&self, path: &str) -> Result<StoredObject, StorageError> {
        validate_path(path)?;
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let object = objects.get(path).ok_or_else(|| StorageError::NotFound {
            path: path.to_string(),
        })?;
        Ok(StoredObject {
            path: path.to_string(),
            content: object.content.clone(),
            content_type: content_type_for(path),
            last_modified: object.last_modified,
        })
    }

    async fn put_object(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        self.put_object_at(path, content, Utc::now())
    }

    async fn delete_object(&self, path: &str) -> Result<(), StorageError> {
        validate_path(path)?;
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_prefix_listing_is_relative() {
        let backend = InMemoryBackend::new();
        let ts = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        backend.put_object_at("org/a-0.1.0.tgz", b"a", ts).unwrap();
        backend.put_object_at("org/repo/b-0.1.0.tgz", b"b", ts).unwrap();
        backend.put_object_at("organic/c-0.1.0.tgz", b"c", ts).unwrap();

        let listed = backend.list_objects("org").await.unwrap();
        let paths: Vec<&str> = listed.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["a-0.1.0.tgz", "repo/b-0.1.0.tgz"]);
        assert_eq!(listed[0].last_modified, ts);

        assert_eq!(backend.list_objects("").await.unwrap().len(), 3);
        assert!(backend.list_objects("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let backend = InMemoryBackend::new();
        backend.put_object("a-0.1.0.tgz", b"abc").await.unwrap();
        assert_eq!(backend.get_object("a-0.1.0.tgz").await.unwrap().content, b"abc");
        backend.delete_object("a-0.1.0.tgz").await.unwrap();
        assert!(backend.is_empty());
        assert!(backend.get_object("a-0.1.0.tgz").await.unwrap_err().is_not_found());
    }
}
