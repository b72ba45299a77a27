//! Lodestar Reconcile - the reconciliation core
//!
//! Turns the desired service set into per-device PathMaps, diffs them
//! against what each device last accepted, pushes the difference and keeps
//! the `applied` and `actual` generations current.
//!
//! - `builder`: pure, deterministic PathMap construction with tie-breaks
//! - `diff`: desired-vs-applied push lists including retractions
//! - `drift`: live state reads and drift reports
//! - `locks`: per-device mutual exclusion in sorted order
//! - `engine`: the pass state machine
//! - `report`: what a pass did
//! - `config`: engine, retry and drift settings

#![forbid(unsafe_code)]

pub mod builder;
pub mod config;
pub mod diff;
pub mod drift;
pub mod engine;
pub mod locks;
pub mod prelude;
pub mod report;

pub use builder::{BuildReport, IntentConflict, PathMapBuilder};
pub use config::{DriftConfig, ReconcileConfig, RetryConfig};
pub use diff::{diff_device, retractions};
pub use drift::{detect_drift, DriftDetector, DriftReport, SyncReport};
pub use engine::ReconcileEngine;
pub use locks::{DeviceGuards, DeviceLocks};
pub use report::{PassPhase, ReconcileReport};

// Changesets are the engine's input
pub use lodestar_intent::Changeset;
