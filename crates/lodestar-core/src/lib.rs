//! Lodestar Core - intent model and reconciliation vocabulary
//!
//! This crate holds the types every other Lodestar crate speaks and the
//! effect traits at the two external boundaries. It performs no I/O itself.
//!
//! # Contents
//!
//! - `identifiers`: `DeviceId`, `ServiceName`, `PortId`, `ProtocolKind`
//! - `intent`: `ServiceDocument`, `ServiceEntry` and submission patches
//! - `path`: YANG-style hierarchical paths with list key predicates
//! - `pathmap`: `PathOp`, `PathMap`, ordering checks, effective state
//! - `schema`: where a service's ports live in the device tree
//! - `effects`: `VersionedStore` and `DeviceAdapter`
//! - `errors`: per-boundary error enums folded into `LodestarError`
//! - `reliability`: retry with backoff

#![forbid(unsafe_code)]

/// Device, service and port identifiers
pub mod identifiers;

/// Service intent documents and submission patches
pub mod intent;

/// YANG-style paths
pub mod path;

/// Path operations and per-device PathMaps
pub mod pathmap;

/// Intent schemas and the schema registry
pub mod schema;

/// Boundary effect traits
pub mod effects;

/// Unified error handling
pub mod errors;

/// Retry with backoff
pub mod reliability;

pub use effects::{
    DeviceAdapter, DeviceTarget, RevisionRef, StorePath, VersionedStore, WriteMode,
    TOMBSTONE_DIGEST,
};
pub use errors::{DeviceError, ErrorClass, LodestarError, StoreError, ValidationError};
pub use identifiers::{DeviceId, PortId, ProtocolKind, ServiceName};
pub use intent::{parse_patches, EntryPatch, ServiceDocument, ServiceEntry, ServicePatch};
pub use path::{PathSegment, YangPath};
pub use pathmap::{check_ordering, effective_state, Operation, PathMap, PathOp};
pub use reliability::{BackoffStrategy, RetryPolicy, RetryResult};
pub use schema::{SchemaRegistry, ServiceSchema};
