//! Generation layout
//!
//! Where each generation lives in the versioned store:
//!
//! | Path | Content |
//! |---|---|
//! | `/Services/all.json` | `ServiceIndex` |
//! | `/Services/{name}/input.json` | `ServiceDocument` (desired) |
//! | `/Services/{name}/output.json` | `PathMap` derived from that document |
//! | `/Devices/all.json` | `DeviceIndex` |
//! | `/Devices/{id}/applied.json` | `GenerationSnapshot` (applied) |
//! | `/Devices/{id}/actual.json` | `GenerationSnapshot` (actual) |
//!
//! `GenerationStore` is only a typed view; ownership of each generation is
//! enforced by who calls which method.

use chrono::{DateTime, Utc};
use lodestar_core::{
    DeviceId, LodestarError, PathMap, PathOp, ProtocolKind, RevisionRef, ServiceDocument,
    ServiceName, StoreError, StorePath, VersionedStore, WriteMode,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Names of every desired service document
pub type ServiceIndex = BTreeSet<ServiceName>;

/// Every device ever configured, with its protocol
pub type DeviceIndex = BTreeMap<DeviceId, ProtocolKind>;

/// Which per-device generation a snapshot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// Last PathMap successfully pushed
    Applied,
    /// Last normalized live read
    Actual,
}

impl Generation {
    fn file_name(self) -> &'static str {
        match self {
            Generation::Applied => "applied.json",
            Generation::Actual => "actual.json",
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Applied => f.write_str("applied"),
            Generation::Actual => f.write_str("actual"),
        }
    }
}

/// One persisted per-device generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    /// Device the ops belong to
    pub device: DeviceId,
    /// Applied or actual
    pub generation: Generation,
    /// Ops in order
    pub ops: Vec<PathOp>,
    /// Reconciliation pass that produced the snapshot, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<Uuid>,
    /// Wall-clock time of the write
    pub recorded_at: DateTime<Utc>,
}

impl GenerationSnapshot {
    /// Snapshot stamped with the current time
    pub fn new(device: DeviceId, generation: Generation, ops: Vec<PathOp>, pass: Option<Uuid>) -> Self {
        Self {
            device,
            generation,
            ops,
            pass,
            recorded_at: Utc::now(),
        }
    }
}

fn store_path(raw: String) -> Result<StorePath, LodestarError> {
    StorePath::new(raw).map_err(LodestarError::from)
}

/// Typed access to the generation layout
#[derive(Clone)]
pub struct GenerationStore {
    store: Arc<dyn VersionedStore>,
}

impl GenerationStore {
    /// Wrap a store handler
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn inner(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    /// `/Services/all.json`
    pub fn services_index_path() -> Result<StorePath, LodestarError> {
        store_path("/Services/all.json".into())
    }

    /// `/Services/{name}/input.json`
    pub fn service_input_path(name: &ServiceName) -> Result<StorePath, LodestarError> {
        store_path(format!("/Services/{name}/input.json"))
    }

    /// `/Services/{name}/output.json`
    pub fn service_output_path(name: &ServiceName) -> Result<StorePath, LodestarError> {
        store_path(format!("/Services/{name}/output.json"))
    }

    /// `/Devices/all.json`
    pub fn devices_index_path() -> Result<StorePath, LodestarError> {
        store_path("/Devices/all.json".into())
    }

    /// `/Devices/{id}/applied.json` or `/Devices/{id}/actual.json`
    pub fn generation_path(device: &DeviceId, generation: Generation) -> Result<StorePath, LodestarError> {
        store_path(format!("/Devices/{device}/{}", generation.file_name()))
    }

    /// Decode the latest revision, `None` when absent or tombstoned
    pub async fn get_json<T: DeserializeOwned>(&self, path: &StorePath) -> Result<Option<T>, LodestarError> {
        match self.store.get(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::corrupt(path.as_str(), e.to_string()).into()),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Encode and write a revision
    pub async fn put_json<T: Serialize + Sync>(
        &self,
        path: &StorePath,
        value: &T,
        mode: WriteMode,
    ) -> Result<RevisionRef, LodestarError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        Ok(self.store.put(path, bytes, mode).await?)
    }

    // ------------------------------------------------------------------
    // Desired
    // ------------------------------------------------------------------

    /// Names of the desired services
    pub async fn load_service_index(&self) -> Result<ServiceIndex, LodestarError> {
        Ok(self
            .get_json(&Self::services_index_path()?)
            .await?
            .unwrap_or_default())
    }

    /// Rewrite the service index
    pub async fn save_service_index(&self, index: &ServiceIndex) -> Result<RevisionRef, LodestarError> {
        self.put_json(&Self::services_index_path()?, index, WriteMode::Create)
            .await
    }

    /// One desired document
    pub async fn load_service(&self, name: &ServiceName) -> Result<Option<ServiceDocument>, LodestarError> {
        self.get_json(&Self::service_input_path(name)?).await
    }

    /// Write a desired document under `mode`
    pub async fn save_service(
        &self,
        doc: &ServiceDocument,
        mode: WriteMode,
    ) -> Result<RevisionRef, LodestarError> {
        self.put_json(&Self::service_input_path(&doc.name)?, doc, mode)
            .await
    }

    /// Tombstone a desired document
    pub async fn delete_service(&self, name: &ServiceName) -> Result<RevisionRef, LodestarError> {
        Ok(self.store.delete(&Self::service_input_path(name)?).await?)
    }

    /// The full desired set, in index order
    ///
    /// A name in the index without a live document is a store inconsistency
    /// and aborts the load.
    pub async fn load_desired(&self) -> Result<Vec<ServiceDocument>, LodestarError> {
        let index = self.load_service_index().await?;
        let mut docs = Vec::with_capacity(index.len());
        for name in &index {
            let doc = self.load_service(name).await?.ok_or_else(|| {
                StoreError::corrupt(
                    Self::service_input_path(name).map(|p| p.to_string()).unwrap_or_default(),
                    "indexed service has no document",
                )
            })?;
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Record the PathMap derived from one service
    pub async fn save_service_output(
        &self,
        name: &ServiceName,
        output: &PathMap,
    ) -> Result<RevisionRef, LodestarError> {
        self.put_json(&Self::service_output_path(name)?, output, WriteMode::Create)
            .await
    }

    /// Last recorded output of one service
    pub async fn load_service_output(&self, name: &ServiceName) -> Result<Option<PathMap>, LodestarError> {
        self.get_json(&Self::service_output_path(name)?).await
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    /// Every known device
    pub async fn load_device_index(&self) -> Result<DeviceIndex, LodestarError> {
        Ok(self
            .get_json(&Self::devices_index_path()?)
            .await?
            .unwrap_or_default())
    }

    /// Rewrite the device index
    pub async fn save_device_index(&self, index: &DeviceIndex) -> Result<RevisionRef, LodestarError> {
        self.put_json(&Self::devices_index_path()?, index, WriteMode::Create)
            .await
    }

    /// Latest applied or actual snapshot of a device
    pub async fn load_generation(
        &self,
        device: &DeviceId,
        generation: Generation,
    ) -> Result<Option<GenerationSnapshot>, LodestarError> {
        self.get_json(&Self::generation_path(device, generation)?)
            .await
    }

    /// Write a new applied or actual revision
    pub async fn save_generation(&self, snapshot: &GenerationSnapshot) -> Result<RevisionRef, LodestarError> {
        let path = Self::generation_path(&snapshot.device, snapshot.generation)?;
        self.put_json(&path, snapshot, WriteMode::Create).await
    }

    /// Applied ops of a device, empty when never applied
    pub async fn load_applied_ops(&self, device: &DeviceId) -> Result<Vec<PathOp>, LodestarError> {
        Ok(self
            .load_generation(device, Generation::Applied)
            .await?
            .map(|snapshot| snapshot.ops)
            .unwrap_or_default())
    }

    /// Revision history of any store path
    pub async fn history(&self, path: &StorePath) -> Result<Vec<RevisionRef>, LodestarError> {
        Ok(self.store.history(path).await?)
    }

    /// Content of one revision, `None` for a tombstone
    pub async fn get_revision(&self, path: &StorePath, seq: u64) -> Result<Option<Vec<u8>>, LodestarError> {
        Ok(self.store.get_revision(path, seq).await?)
    }
}
