//! Filesystem versioned store
//!
//! Layout under the root directory:
//!
//! - `objects/<blake3>`: content blobs, addressed by digest
//! - `refs/<blake3(path)>.log`: JSON lines, one `RevisionRef` per revision
//!
//! Both kinds of file are written to a temp file and renamed into place, so
//! a crash never leaves a torn blob or log behind. Writers are serialized by
//! an in-process lock.

use crate::{check_mode, content_digest};
use async_trait::async_trait;
use lodestar_core::{RevisionRef, StoreError, StorePath, VersionedStore, WriteMode, TOMBSTONE_DIGEST};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Versioned store persisted under a local directory
pub struct FilesystemVersionedStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FilesystemVersionedStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("objects")).await?;
        fs::create_dir_all(root.join("refs")).await?;
        info!(root = %root.display(), "opened filesystem store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, digest: &str) -> PathBuf {
        self.root.join("objects").join(digest)
    }

    fn log_path(&self, path: &StorePath) -> PathBuf {
        let hash = blake3::hash(path.as_str().as_bytes());
        self.root.join("refs").join(format!("{}.log", hash.to_hex()))
    }

    async fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<(), StoreError> {
        let temp_path = target.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, target).await?;
        Ok(())
    }

    async fn read_log(&self, path: &StorePath) -> Result<Vec<RevisionRef>, StoreError> {
        let bytes = match fs::read(self.log_path(path)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| StoreError::corrupt(path.as_str(), e.to_string()))?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<RevisionRef>(line)
                    .map_err(|e| StoreError::corrupt(path.as_str(), e.to_string()))
            })
            .collect()
    }

    async fn append_log(
        &self,
        path: &StorePath,
        mut log: Vec<RevisionRef>,
        digest: String,
    ) -> Result<RevisionRef, StoreError> {
        let reference = RevisionRef {
            path: path.clone(),
            seq: log.len() as u64 + 1,
            digest,
        };
        log.push(reference.clone());

        let mut text = String::new();
        for entry in &log {
            let line = serde_json::to_string(entry)
                .map_err(|e| StoreError::corrupt(path.as_str(), e.to_string()))?;
            text.push_str(&line);
            text.push('\n');
        }
        self.write_atomic(&self.log_path(path), text.as_bytes()).await?;
        Ok(reference)
    }

    async fn read_object(&self, reference: &RevisionRef) -> Result<Option<Vec<u8>>, StoreError> {
        if reference.is_tombstone() {
            return Ok(None);
        }
        let content = fs::read(self.object_path(&reference.digest)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::corrupt(reference.path.as_str(), "missing object")
            } else {
                e.into()
            }
        })?;
        if content_digest(&content) != reference.digest {
            return Err(StoreError::corrupt(
                reference.path.as_str(),
                "object digest mismatch",
            ));
        }
        Ok(Some(content))
    }
}

fn is_live(log: &[RevisionRef]) -> bool {
    log.last().is_some_and(|rev| !rev.is_tombstone())
}

#[async_trait]
impl VersionedStore for FilesystemVersionedStore {
    async fn get(&self, path: &StorePath) -> Result<Vec<u8>, StoreError> {
        let log = self.read_log(path).await?;
        match log.last() {
            Some(latest) => self
                .read_object(latest)
                .await?
                .ok_or_else(|| StoreError::not_found(path.as_str())),
            None => Err(StoreError::not_found(path.as_str())),
        }
    }

    async fn put(
        &self,
        path: &StorePath,
        content: Vec<u8>,
        mode: WriteMode,
    ) -> Result<RevisionRef, StoreError> {
        let _guard = self.write_lock.lock().await;
        let log = self.read_log(path).await?;
        check_mode(path, is_live(&log), mode)?;

        let digest = content_digest(&content);
        let object = self.object_path(&digest);
        if fs::metadata(&object).await.is_err() {
            self.write_atomic(&object, &content).await?;
        }
        let reference = self.append_log(path, log, digest).await?;
        debug!(path = %path, seq = reference.seq, "stored revision");
        Ok(reference)
    }

    async fn delete(&self, path: &StorePath) -> Result<RevisionRef, StoreError> {
        let _guard = self.write_lock.lock().await;
        let log = self.read_log(path).await?;
        if !is_live(&log) {
            return Err(StoreError::not_found(path.as_str()));
        }
        let reference = self
            .append_log(path, log, TOMBSTONE_DIGEST.to_string())
            .await?;
        debug!(path = %path, seq = reference.seq, "stored tombstone");
        Ok(reference)
    }

    async fn history(&self, path: &StorePath) -> Result<Vec<RevisionRef>, StoreError> {
        self.read_log(path).await
    }

    async fn get_revision(
        &self,
        path: &StorePath,
        seq: u64,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let log = self.read_log(path).await?;
        let reference = seq
            .checked_sub(1)
            .and_then(|idx| log.get(idx as usize))
            .ok_or_else(|| StoreError::not_found(format!("{path}@{seq}")))?;
        self.read_object(reference).await
    }
}
