//! Versioned store effect
//!
//! A flat namespace of hierarchical paths, each holding a chain of
//! revisions. Every write appends a revision; deletes append a tombstone.
//! Nothing is ever removed from a chain.

use crate::errors::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Digest recorded for tombstone revisions
pub const TOMBSTONE_DIGEST: &str = "tombstone";

/// Write precondition for `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Write unconditionally, creating or superseding
    Create,
    /// Fail with `AlreadyExists` when the path is live
    CreateSafe,
    /// Fail with `NotFound` when the path is not live
    Update,
}

/// Validated absolute store path such as `/Devices/cassini1/applied.json`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorePath(String);

impl StorePath {
    /// Validate and wrap a path
    pub fn new(raw: impl Into<String>) -> Result<Self, StoreError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(Self(raw))
    }

    fn validate(raw: &str) -> Result<(), StoreError> {
        let invalid = |reason: &str| StoreError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let body = raw
            .strip_prefix('/')
            .ok_or_else(|| invalid("path must start with '/'"))?;
        if body.is_empty() {
            return Err(invalid("path must name a document"));
        }
        if raw.contains('\0') {
            return Err(invalid("path contains a NUL byte"));
        }
        for segment in body.split('/') {
            match segment {
                "" => return Err(invalid("empty path segment")),
                "." | ".." => return Err(invalid("relative path segment")),
                _ => {}
            }
        }
        Ok(())
    }

    /// Append segments, validating the result
    pub fn join(&self, tail: &str) -> Result<Self, StoreError> {
        Self::new(format!("{}/{}", self.0, tail.trim_start_matches('/')))
    }

    /// Path text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StorePath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StorePath> for String {
    fn from(path: StorePath) -> Self {
        path.0
    }
}

/// Handle on one persisted revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionRef {
    /// Store path the revision belongs to
    pub path: StorePath,
    /// Position in the path's chain, starting at 1
    pub seq: u64,
    /// blake3 hex digest of the content, or `tombstone`
    pub digest: String,
}

impl RevisionRef {
    /// True when the revision records a delete
    pub fn is_tombstone(&self) -> bool {
        self.digest == TOMBSTONE_DIGEST
    }
}

impl fmt::Display for RevisionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{}@{} ({short})", self.path, self.seq)
    }
}

/// Versioned blob storage
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Content of the latest live revision
    async fn get(&self, path: &StorePath) -> Result<Vec<u8>, StoreError>;

    /// Append a content revision under `mode`'s precondition
    async fn put(
        &self,
        path: &StorePath,
        content: Vec<u8>,
        mode: WriteMode,
    ) -> Result<RevisionRef, StoreError>;

    /// Append a tombstone; `NotFound` when the path is not live
    async fn delete(&self, path: &StorePath) -> Result<RevisionRef, StoreError>;

    /// Every revision of `path`, oldest first; empty when never written
    async fn history(&self, path: &StorePath) -> Result<Vec<RevisionRef>, StoreError>;

    /// Content of revision `seq`; `None` for a tombstone
    async fn get_revision(&self, path: &StorePath, seq: u64)
        -> Result<Option<Vec<u8>>, StoreError>;

    /// Whether the latest revision is live
    async fn exists(&self, path: &StorePath) -> Result<bool, StoreError> {
        match self.get(path).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_path_validation() {
        assert!(StorePath::new("/Devices/cassini1/applied.json").is_ok());
        for bad in ["Devices/x", "/", "/a//b", "/a/../b", "/a/./b", "/a\0b"] {
            assert!(
                matches!(StorePath::new(bad), Err(StoreError::InvalidPath { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_join_validates_tail() {
        let base = StorePath::new("/Services").unwrap();
        assert_eq!(
            base.join("transceivers/input.json").unwrap().as_str(),
            "/Services/transceivers/input.json"
        );
        assert!(base.join("../etc").is_err());
    }

    #[test]
    fn test_tombstone_ref() {
        let rev = RevisionRef {
            path: StorePath::new("/a").unwrap(),
            seq: 2,
            digest: TOMBSTONE_DIGEST.to_string(),
        };
        assert!(rev.is_tombstone());
        assert_eq!(rev.to_string(), "/a@2 (tombstone)");
    }
}
