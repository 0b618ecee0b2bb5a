//! Local filesystem backend.
//!
//! Objects map to files under a root directory. Writes go to a hidden temp
//! file first and are renamed into place, so a concurrent listing never sees
//! a half-written package. Hidden files are skipped when listing.

use async_trait::async_trait;
use chartmill_core::{ObjectDescriptor, StorageError};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{content_type_for, normalize_prefix, validate_path, StorageBackend, StoredObject};

/// Storage backend rooted at a local directory.
#[derive(Debug)]
pub struct LocalFilesystemBackend {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl LocalFilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

fn io_error(path: &str, err: std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound {
            path: path.to_string(),
        }
    } else {
        StorageError::Io {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl StorageBackend for LocalFilesystemBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, StorageError> {
        let prefix = normalize_prefix(prefix)?;
        let base = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&prefix)
        };

        let mut objects = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(base, String::new())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error(&prefix, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let rel_path = if rel.is_empty() {
                    name
                } else {
                    format!("{rel}/{name}")
                };
                let meta = entry.metadata().await.map_err(|e| io_error(&rel_path, e))?;
                if meta.is_dir() {
                    pending.push((entry.path(), rel_path));
                } else if meta.is_file() {
                    objects.push(ObjectDescriptor::new(
                        rel_path,
                        meta.len(),
                        modified_at(&meta),
                    ));
                }
            }
        }

        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }

    async fn get_object(&self, path: &str) -> Result<StoredObject, StorageError> {
        let full = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full).await.map_err(|e| io_error(path, e))?;
        if !meta.is_file() {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        let content = tokio::fs::read(&full).await.map_err(|e| io_error(path, e))?;
        Ok(StoredObject {
            path: path.to_string(),
            content,
            content_type: content_type_for(path),
            last_modified: modified_at(&meta),
        })
    }

    async fn put_object(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        let parent = full.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| io_error(path, e))?;

        let file_name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = parent.join(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_error(path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &full).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(path, e));
        }
        tracing::trace!(path, bytes = content.len(), "Stored object");
        Ok(())
    }

    async fn delete_object(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| io_error(path, e))
    }
}
