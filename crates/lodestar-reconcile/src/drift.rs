//! Drift Detector
//!
//! Sole writer of the `actual` generation. It reads devices through the
//! adapter, stores the normalized state, and compares it with the state the
//! applied PathMap implies. It never touches `desired` or `applied`.

use crate::locks::DeviceLocks;
use futures::stream::{self, StreamExt};
use lodestar_core::{
    effective_state, DeviceAdapter, DeviceError, DeviceId, DeviceTarget, LodestarError, PathOp, RevisionRef,
    YangPath,
};
use lodestar_store::{Generation, GenerationSnapshot, GenerationStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Difference between live state and the applied generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Live leaves the applied state does not have, or has with another value
    pub unexpected: Vec<PathOp>,
    /// Applied leaves the device does not have
    pub missing: Vec<PathOp>,
}

impl DriftReport {
    /// True when live state matches applied state
    pub fn is_empty(&self) -> bool {
        self.unexpected.is_empty() && self.missing.is_empty()
    }
}

/// Compare live leaves against the state applied ops imply
pub fn detect_drift(applied: &[PathOp], actual: &[PathOp]) -> DriftReport {
    let expected: BTreeMap<YangPath, Value> = effective_state(applied);
    let live: BTreeMap<YangPath, Value> = effective_state(actual);

    let unexpected = live
        .iter()
        .filter(|(path, value)| expected.get(*path) != Some(*value))
        .map(|(path, value)| PathOp::set(path.clone(), value.clone()))
        .collect();
    let missing = expected
        .iter()
        .filter(|(path, _)| !live.contains_key(*path))
        .map(|(path, value)| PathOp::set(path.clone(), value.clone()))
        .collect();

    DriftReport {
        unexpected,
        missing,
    }
}

/// Result of one `sync_actual` round
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Devices with a new `actual` revision
    pub updated: BTreeSet<DeviceId>,
    /// Devices whose live state differs from `applied`
    pub conflicts: BTreeMap<DeviceId, DriftReport>,
    /// Devices that could not be read or recorded
    pub errors: BTreeMap<DeviceId, LodestarError>,
}

impl SyncReport {
    /// True when every device was read and none drifted
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.errors.is_empty()
    }
}

/// Reads devices and records the `actual` generation
#[derive(Clone)]
pub struct DriftDetector {
    generations: GenerationStore,
    adapter: Arc<dyn DeviceAdapter>,
    locks: DeviceLocks,
    max_concurrent: usize,
    read_timeout: Duration,
}

impl DriftDetector {
    /// Detector sharing `locks` with the engine
    ///
    /// A device read that outlasts `read_timeout` fails with
    /// `DeviceError::Timeout`.
    pub fn new(
        generations: GenerationStore,
        adapter: Arc<dyn DeviceAdapter>,
        locks: DeviceLocks,
        max_concurrent: usize,
        read_timeout: Duration,
    ) -> Self {
        Self {
            generations,
            adapter,
            locks,
            max_concurrent: max_concurrent.max(1),
            read_timeout,
        }
    }

    /// Read `targets`, store their `actual` generation and report drift
    pub async fn sync_actual(&self, targets: &[DeviceTarget]) -> SyncReport {
        let _guards = self.locks.acquire(targets.iter().map(|t| &t.id)).await;

        let outcomes: Vec<_> = stream::iter(targets)
            .map(|target| async move {
                let result = self.sync_locked(target, None).await;
                (target.id.clone(), result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut report = SyncReport::default();
        for (device, result) in outcomes {
            match result {
                Ok((_, drift)) => {
                    report.updated.insert(device.clone());
                    if !drift.is_empty() {
                        report.conflicts.insert(device, drift);
                    }
                }
                Err(err) => {
                    report.errors.insert(device, err);
                }
            }
        }
        tracing::info!(
            updated = report.updated.len(),
            conflicts = report.conflicts.len(),
            errors = report.errors.len(),
            "synced actual state"
        );
        report
    }

    /// `sync_actual` over every device in the device index
    pub async fn sync_all(&self) -> Result<SyncReport, LodestarError> {
        let index = self.generations.load_device_index().await?;
        let targets: Vec<DeviceTarget> = index
            .into_iter()
            .map(|(id, protocol)| DeviceTarget::new(id, protocol))
            .collect();
        Ok(self.sync_actual(&targets).await)
    }

    /// Sync one device whose lock the caller already holds
    pub(crate) async fn sync_locked(
        &self,
        target: &DeviceTarget,
        pass: Option<Uuid>,
    ) -> Result<(RevisionRef, DriftReport), LodestarError> {
        let span = tracing::debug_span!("sync_device", device = %target.id);
        async {
            let live = self.read_live(target).await?;
            let snapshot =
                GenerationSnapshot::new(target.id.clone(), Generation::Actual, live, pass);
            let revision = self.generations.save_generation(&snapshot).await?;
            let applied = self.generations.load_applied_ops(&target.id).await?;
            let drift = detect_drift(&applied, &snapshot.ops);
            if !drift.is_empty() {
                tracing::warn!(
                    unexpected = drift.unexpected.len(),
                    missing = drift.missing.len(),
                    "device drifted from applied state"
                );
            }
            Ok((revision, drift))
        }
        .instrument(span)
        .await
    }

    async fn read_live(&self, target: &DeviceTarget) -> Result<Vec<PathOp>, LodestarError> {
        match tokio::time::timeout(self.read_timeout, self.adapter.read(target)).await {
            Ok(read) => Ok(read?),
            Err(_) => {
                tracing::warn!(device = %target.id, "device read timed out");
                Err(DeviceError::Timeout {
                    device: target.id.clone(),
                    after_ms: u64::try_from(self.read_timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into())
            }
        }
    }

    /// Run `sync_all` every `interval` until `cancel` fires
    ///
    /// Each round's report (or load failure) goes to `on_round`. The first
    /// round runs immediately.
    pub async fn watch<F>(&self, interval: Duration, cancel: CancellationToken, mut on_round: F)
    where
        F: FnMut(Result<SyncReport, LodestarError>),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("drift watch stopped");
                    return;
                }
                _ = ticker.tick() => {
                    on_round(self.sync_all().await);
                }
            }
        }
    }
}
