//! In-memory versioned store

use crate::{check_mode, content_digest};
use async_trait::async_trait;
use lodestar_core::{RevisionRef, StoreError, StorePath, VersionedStore, WriteMode, TOMBSTONE_DIGEST};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Revision {
    reference: RevisionRef,
    content: Option<Arc<Vec<u8>>>,
}

/// Revision chains held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryVersionedStore {
    chains: Arc<RwLock<HashMap<StorePath, Vec<Revision>>>>,
}

impl MemoryVersionedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths that were ever written
    pub async fn path_count(&self) -> usize {
        self.chains.read().await.len()
    }

    fn append(chain: &mut Vec<Revision>, path: &StorePath, content: Option<Vec<u8>>) -> RevisionRef {
        let digest = content
            .as_deref()
            .map_or_else(|| TOMBSTONE_DIGEST.to_string(), content_digest);
        let reference = RevisionRef {
            path: path.clone(),
            seq: chain.len() as u64 + 1,
            digest,
        };
        chain.push(Revision {
            reference: reference.clone(),
            content: content.map(Arc::new),
        });
        reference
    }
}

fn is_live(chain: Option<&Vec<Revision>>) -> bool {
    chain
        .and_then(|revisions| revisions.last())
        .is_some_and(|rev| rev.content.is_some())
}

#[async_trait]
impl VersionedStore for MemoryVersionedStore {
    async fn get(&self, path: &StorePath) -> Result<Vec<u8>, StoreError> {
        let chains = self.chains.read().await;
        chains
            .get(path)
            .and_then(|chain| chain.last())
            .and_then(|rev| rev.content.as_ref())
            .map(|content| content.as_ref().clone())
            .ok_or_else(|| StoreError::not_found(path.as_str()))
    }

    async fn put(
        &self,
        path: &StorePath,
        content: Vec<u8>,
        mode: WriteMode,
    ) -> Result<RevisionRef, StoreError> {
        let mut chains = self.chains.write().await;
        check_mode(path, is_live(chains.get(path)), mode)?;
        let chain = chains.entry(path.clone()).or_default();
        Ok(Self::append(chain, path, Some(content)))
    }

    async fn delete(&self, path: &StorePath) -> Result<RevisionRef, StoreError> {
        let mut chains = self.chains.write().await;
        if !is_live(chains.get(path)) {
            return Err(StoreError::not_found(path.as_str()));
        }
        let chain = chains.entry(path.clone()).or_default();
        Ok(Self::append(chain, path, None))
    }

    async fn history(&self, path: &StorePath) -> Result<Vec<RevisionRef>, StoreError> {
        let chains = self.chains.read().await;
        Ok(chains
            .get(path)
            .map(|chain| chain.iter().map(|rev| rev.reference.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_revision(
        &self,
        path: &StorePath,
        seq: u64,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let chains = self.chains.read().await;
        let revision = seq
            .checked_sub(1)
            .and_then(|idx| chains.get(path)?.get(idx as usize))
            .ok_or_else(|| StoreError::not_found(format!("{path}@{seq}")))?;
        Ok(revision.content.as_ref().map(|content| content.as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> StorePath {
        StorePath::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_write_modes() {
        let store = MemoryVersionedStore::new();
        let p = path("/Services/transceivers/input.json");

        assert!(matches!(
            store.put(&p, b"{}".to_vec(), WriteMode::Update).await,
            Err(StoreError::NotFound { .. })
        ));
        store.put(&p, b"{}".to_vec(), WriteMode::CreateSafe).await.unwrap();
        assert!(matches!(
            store.put(&p, b"{}".to_vec(), WriteMode::CreateSafe).await,
            Err(StoreError::AlreadyExists { .. })
        ));
        store.put(&p, b"[1]".to_vec(), WriteMode::Update).await.unwrap();
        let rev = store.put(&p, b"[2]".to_vec(), WriteMode::Create).await.unwrap();
        assert_eq!(rev.seq, 3);
        assert_eq!(store.get(&p).await.unwrap(), b"[2]");
    }

    #[tokio::test]
    async fn test_delete_keeps_history() {
        let store = MemoryVersionedStore::new();
        let p = path("/Devices/cassini1/applied.json");

        store.put(&p, b"v1".to_vec(), WriteMode::Create).await.unwrap();
        let tomb = store.delete(&p).await.unwrap();
        assert!(tomb.is_tombstone());
        assert!(!store.exists(&p).await.unwrap());
        assert!(matches!(store.delete(&p).await, Err(StoreError::NotFound { .. })));

        let history = store.history(&p).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(store.get_revision(&p, 1).await.unwrap().unwrap(), b"v1");
        assert_eq!(store.get_revision(&p, 2).await.unwrap(), None);
        assert!(store.get_revision(&p, 0).await.is_err());

        // A tombstoned path can be created again, even in safe mode
        store.put(&p, b"v2".to_vec(), WriteMode::CreateSafe).await.unwrap();
        assert_eq!(store.history(&p).await.unwrap().len(), 3);
    }
}
