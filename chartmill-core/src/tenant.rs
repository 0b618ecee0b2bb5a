//! Tenant keys.
//!
//! A tenant is the repository addressed by the leading path segments of a
//! request. `TenantKey` has a private inner so every key in the system went
//! through `parse` or `from_segments`, which reject traversal segments. That
//! makes it safe to use a key directly as a storage prefix.

use std::fmt;

use crate::error::StorageError;

/// A validated tenant path such as `org/team/repo`. The empty key is the
/// root tenant used when multitenancy is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantKey {
    inner: TenantKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct TenantKeyInner {
    joined: String,
}

impl TenantKey {
    /// The root tenant (depth 0).
    pub fn root() -> Self {
        Self {
            inner: TenantKeyInner {
                joined: String::new(),
            },
        }
    }

    /// Parse a `/`-joined tenant path. Leading and trailing slashes are
    /// ignored; empty inner segments are not.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::from_segments(trimmed.split('/'))
    }

    /// Build a key from individual path segments.
    pub fn from_segments<'a, I>(segments: I) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let segments: Vec<&str> = segments.into_iter().collect();
        for segment in &segments {
            if !is_valid_segment(segment) {
                return Err(StorageError::InvalidPath {
                    path: segments.join("/"),
                });
            }
        }
        Ok(Self {
            inner: TenantKeyInner {
                joined: segments.join("/"),
            },
        })
    }

    pub fn as_str(&self) -> &str {
        &self.inner.joined
    }

    pub fn is_root(&self) -> bool {
        self.inner.joined.is_empty()
    }

    /// Number of path segments in the key.
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.inner.joined.split('/').count()
        }
    }

    /// Storage path of `name` inside this tenant's prefix.
    pub fn object_path(&self, name: &str) -> String {
        if self.is_root() {
            name.to_string()
        } else {
            format!("{}/{}", self.inner.joined, name)
        }
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.joined)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(|c: char| c == '/' || c == '\\')
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_segments_round_trip(segments in prop::collection::vec("[a-z0-9_-]{1,8}", 0..5)) {
            let key = TenantKey::from_segments(segments.iter().map(String::as_str)).unwrap();
            prop_assert_eq!(key.depth(), segments.len());
            prop_assert_eq!(TenantKey::parse(key.as_str()).unwrap(), key);
        }
    }
}
