//! Reconciliation pass report

use crate::builder::IntentConflict;
use crate::drift::DriftReport;
use lodestar_core::{DeviceId, ErrorClass, LodestarError, PathOp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Where a pass stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPhase {
    /// Desired, applied and actual are loaded
    Loaded,
    /// PathMap computed
    Built,
    /// Per-device push lists computed; a plan ends here
    Diffed,
    /// Devices are being pushed
    Applying,
    /// Every affected device converged
    Committed,
    /// At least one device failed or was cancelled
    Failed,
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassPhase::Loaded => "loaded",
            PassPhase::Built => "built",
            PassPhase::Diffed => "diffed",
            PassPhase::Applying => "applying",
            PassPhase::Committed => "committed",
            PassPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Full outcome of one reconciliation pass or plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Pass identifier, also stamped on the generations it wrote
    pub pass_id: Uuid,
    /// Final phase
    pub phase: PassPhase,
    /// Devices the pass covered
    pub affected_devices: BTreeSet<DeviceId>,
    /// Ops each device needed; empty lists are omitted
    pub planned: BTreeMap<DeviceId, Vec<PathOp>>,
    /// Devices whose ops were written
    pub pushed: BTreeSet<DeviceId>,
    /// Devices whose `applied` now equals the PathMap
    pub converged: BTreeSet<DeviceId>,
    /// Per-device failures
    pub errors: BTreeMap<DeviceId, LodestarError>,
    /// Devices skipped because the pass was cancelled
    pub cancelled: BTreeSet<DeviceId>,
    /// Devices whose live state differed from `applied` at load time
    pub drift: BTreeMap<DeviceId, DriftReport>,
    /// Intent tie-breaks made by the builder
    pub conflicts: Vec<IntentConflict>,
    /// Non-fatal problems such as a failed audit write
    pub warnings: Vec<String>,
}

impl ReconcileReport {
    pub(crate) fn new(pass_id: Uuid, affected_devices: BTreeSet<DeviceId>) -> Self {
        Self {
            pass_id,
            phase: PassPhase::Loaded,
            affected_devices,
            planned: BTreeMap::new(),
            pushed: BTreeSet::new(),
            converged: BTreeSet::new(),
            errors: BTreeMap::new(),
            cancelled: BTreeSet::new(),
            drift: BTreeMap::new(),
            conflicts: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// True when the pass committed every device
    pub fn is_success(&self) -> bool {
        self.phase == PassPhase::Committed
    }

    /// Client when every failure is a client error, otherwise server
    ///
    /// `None` for a clean pass.
    pub fn class(&self) -> Option<ErrorClass> {
        if self.errors.is_empty() && self.cancelled.is_empty() {
            return None;
        }
        if self.cancelled.is_empty() && self.errors.values().all(|e| e.class() == ErrorClass::Client) {
            Some(ErrorClass::Client)
        } else {
            Some(ErrorClass::Server)
        }
    }

    /// Number of ops across all planned devices
    pub fn planned_op_count(&self) -> usize {
        self.planned.values().map(Vec::len).sum()
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "pass {} {}: {} affected, {} pushed, {} errors, {} cancelled, {} drifted, {} conflicts",
            self.pass_id,
            self.phase,
            self.affected_devices.len(),
            self.pushed.len(),
            self.errors.len(),
            self.cancelled.len(),
            self.drift.len(),
            self.conflicts.len()
        )
    }
}
