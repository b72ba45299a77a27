//! Lodestar Store - versioned store handlers
//!
//! Two `VersionedStore` handlers and the generation layout on top of them:
//!
//! - `MemoryVersionedStore`: revision chains in a map, for tests and the
//!   `memory` backend
//! - `FilesystemVersionedStore`: content-addressed blobs plus per-path
//!   revision logs, written atomically
//! - `GenerationStore`: where desired, applied and actual live, and typed
//!   JSON access to them

#![forbid(unsafe_code)]

pub mod filesystem;
pub mod generations;
pub mod memory;

pub use filesystem::FilesystemVersionedStore;
pub use generations::{DeviceIndex, Generation, GenerationSnapshot, GenerationStore, ServiceIndex};
pub use memory::MemoryVersionedStore;

use lodestar_core::{StoreError, StorePath, WriteMode};

/// blake3 hex digest used as a revision's content address
pub fn content_digest(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Enforce a write mode against the path's current liveness
pub(crate) fn check_mode(path: &StorePath, live: bool, mode: WriteMode) -> Result<(), StoreError> {
    match (mode, live) {
        (WriteMode::CreateSafe, true) => Err(StoreError::AlreadyExists {
            path: path.to_string(),
        }),
        (WriteMode::Update, false) => Err(StoreError::not_found(path.as_str())),
        _ => Ok(()),
    }
}
