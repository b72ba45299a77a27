//! Effect trait definitions
//!
//! The reconciliation core only performs two kinds of side effect: reading
//! and writing the versioned store, and reading and writing devices. This
//! module defines **what** those effects are; `lodestar-store` and
//! `lodestar-devices` define **how**.
//!
//! All effect-using code is parameterized by these traits, so tests swap in
//! in-memory handlers with fault injection.

pub mod device;
pub mod store;

pub use device::{DeviceAdapter, DeviceTarget};
pub use store::{RevisionRef, StorePath, VersionedStore, WriteMode, TOMBSTONE_DIGEST};
