//! Versioned store wrapper with injectable failures

use async_trait::async_trait;
use lodestar_core::{RevisionRef, StoreError, StorePath, VersionedStore, WriteMode};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Faults {
    next_calls: u32,
    put_prefix: Option<String>,
}

/// Delegates to an inner store unless a fault is armed
///
/// `fail_next(n)` fails the next `n` calls of any kind with
/// `StoreError::Unavailable`. `fail_puts_under(prefix)` fails every write
/// to a path starting with `prefix` until cleared.
#[derive(Clone)]
pub struct FlakyStore {
    inner: Arc<dyn VersionedStore>,
    faults: Arc<Mutex<Faults>>,
}

impl FlakyStore {
    /// Wrap `inner` with no faults armed
    pub fn new(inner: Arc<dyn VersionedStore>) -> Self {
        Self {
            inner,
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Fail the next `calls` store calls
    pub fn fail_next(&self, calls: u32) {
        self.faults.lock().next_calls = calls;
    }

    /// Fail writes under `prefix`
    pub fn fail_puts_under(&self, prefix: impl Into<String>) {
        self.faults.lock().put_prefix = Some(prefix.into());
    }

    /// Disarm every fault
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    fn trip(&self) -> Result<(), StoreError> {
        let mut faults = self.faults.lock();
        if faults.next_calls > 0 {
            faults.next_calls -= 1;
            return Err(StoreError::unavailable("injected store failure"));
        }
        Ok(())
    }

    fn trip_write(&self, path: &StorePath) -> Result<(), StoreError> {
        self.trip()?;
        let faults = self.faults.lock();
        match &faults.put_prefix {
            Some(prefix) if path.as_str().starts_with(prefix.as_str()) => Err(
                StoreError::unavailable(format!("injected write failure for {path}")),
            ),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VersionedStore for FlakyStore {
    async fn get(&self, path: &StorePath) -> Result<Vec<u8>, StoreError> {
        self.trip()?;
        self.inner.get(path).await
    }

    async fn put(
        &self,
        path: &StorePath,
        content: Vec<u8>,
        mode: WriteMode,
    ) -> Result<RevisionRef, StoreError> {
        self.trip_write(path)?;
        self.inner.put(path, content, mode).await
    }

    async fn delete(&self, path: &StorePath) -> Result<RevisionRef, StoreError> {
        self.trip_write(path)?;
        self.inner.delete(path).await
    }

    async fn history(&self, path: &StorePath) -> Result<Vec<RevisionRef>, StoreError> {
        self.trip()?;
        self.inner.history(path).await
    }

    async fn get_revision(&self, path: &StorePath, seq: u64) -> Result<Option<Vec<u8>>, StoreError> {
        self.trip()?;
        self.inner.get_revision(path, seq).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_store::MemoryVersionedStore;

    #[tokio::test]
    async fn test_fail_next_counts_down() {
        let store = FlakyStore::new(Arc::new(MemoryVersionedStore::new()));
        let path = StorePath::new("/a").unwrap();
        store.fail_next(2);

        assert!(store.put(&path, b"x".to_vec(), WriteMode::Create).await.is_err());
        assert!(store.get(&path).await.is_err());
        store.put(&path, b"x".to_vec(), WriteMode::Create).await.unwrap();
        assert_eq!(store.get(&path).await.unwrap(), b"x".to_vec());
    }

    #[tokio::test]
    async fn test_prefix_faults_only_hit_writes() {
        let store = FlakyStore::new(Arc::new(MemoryVersionedStore::new()));
        let inside = StorePath::new("/Devices/d1/applied.json").unwrap();
        let outside = StorePath::new("/Services/all.json").unwrap();
        store.fail_puts_under("/Devices/");

        assert!(store.put(&inside, b"{}".to_vec(), WriteMode::Create).await.is_err());
        store.put(&outside, b"[]".to_vec(), WriteMode::Create).await.unwrap();
        assert!(matches!(store.get(&inside).await, Err(StoreError::NotFound { .. })));

        store.clear_faults();
        store.put(&inside, b"{}".to_vec(), WriteMode::Create).await.unwrap();
    }
}
