//! Lodestar reconcile prelude.
//!
//! Curated re-exports for driving reconciliation passes.

pub use crate::{
    Changeset, DriftDetector, DriftReport, IntentConflict, PassPhase, PathMapBuilder,
    ReconcileConfig, ReconcileEngine, ReconcileReport, SyncReport,
};
pub use tokio_util::sync::CancellationToken;
