//! Reconciliation Engine
//!
//! Drives one pass through `Loaded → Built → Diffed → Applying → Committed`
//! (or `Failed`). Every pass recomputes the PathMap from the full desired
//! set, pushes only the per-device difference against `applied`, and moves
//! `applied` forward only for devices whose push succeeded.
//!
//! Failures are contained per device. Errors that happen before any device
//! is touched (loading state, cancellation while waiting for locks) abort
//! the pass and are returned as `Err`; everything after that lands in the
//! returned [`ReconcileReport`].

use crate::builder::PathMapBuilder;
use crate::config::ReconcileConfig;
use crate::diff::diff_device;
use crate::drift::{detect_drift, DriftDetector};
use crate::locks::DeviceLocks;
use crate::report::{PassPhase, ReconcileReport};
use futures::stream::{self, StreamExt};
use lodestar_core::{
    DeviceAdapter, DeviceError, DeviceId, DeviceTarget, LodestarError, PathMap, PathOp, ProtocolKind,
    RetryPolicy, SchemaRegistry, ServiceDocument, ServiceName,
};
use lodestar_intent::Changeset;
use lodestar_store::{Generation, GenerationSnapshot, GenerationStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassMode {
    Apply,
    Plan,
}

/// Everything the apply stage needs for one device
#[derive(Debug)]
struct DevicePlan {
    target: DeviceTarget,
    desired: Vec<PathOp>,
    to_push: Vec<PathOp>,
    commit: bool,
}

#[derive(Debug)]
enum DeviceOutcome {
    Cancelled,
    Failed { error: LodestarError, pushed: bool },
    Converged { pushed: bool, warning: Option<String> },
}

/// Reconciles desired intent onto devices
#[derive(Clone)]
pub struct ReconcileEngine {
    generations: GenerationStore,
    adapter: Arc<dyn DeviceAdapter>,
    builder: PathMapBuilder,
    drift: DriftDetector,
    locks: DeviceLocks,
    config: ReconcileConfig,
}

impl ReconcileEngine {
    /// Engine over `generations` pushing through `adapter`
    pub fn new(
        generations: GenerationStore,
        adapter: Arc<dyn DeviceAdapter>,
        schemas: Arc<SchemaRegistry>,
        config: ReconcileConfig,
    ) -> Result<Self, LodestarError> {
        config.validate()?;
        let locks = DeviceLocks::new();
        let drift = DriftDetector::new(
            generations.clone(),
            Arc::clone(&adapter),
            locks.clone(),
            config.max_concurrent_pushes,
            config.push_timeout(),
        );
        Ok(Self {
            generations,
            adapter,
            builder: PathMapBuilder::new(schemas),
            drift,
            locks,
            config,
        })
    }

    /// Drift detector sharing this engine's device locks
    pub fn drift_detector(&self) -> &DriftDetector {
        &self.drift
    }

    /// Per-device lock table
    pub fn locks(&self) -> &DeviceLocks {
        &self.locks
    }

    /// Active configuration
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Generation store the engine reads and commits to
    pub fn generations(&self) -> &GenerationStore {
        &self.generations
    }

    /// Run one pass over the devices in `changeset`
    pub async fn reconcile(
        &self,
        changeset: &Changeset,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, LodestarError> {
        self.run(changeset, cancel, PassMode::Apply).await
    }

    /// Dry run: stop at `Diffed` without pushing or committing
    pub async fn plan(&self, changeset: &Changeset) -> Result<ReconcileReport, LodestarError> {
        self.run(changeset, &CancellationToken::new(), PassMode::Plan)
            .await
    }

    /// Reconcile every indexed device and every device the desired set names
    pub async fn reconcile_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, LodestarError> {
        let changeset = self.full_changeset().await?;
        self.reconcile(&changeset, cancel).await
    }

    /// `reconcile`, retrying the whole pass on retryable store errors
    pub async fn reconcile_with_retry(
        &self,
        changeset: &Changeset,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, LodestarError> {
        let outcome = policy
            .execute(LodestarError::is_retryable, move |attempt| async move {
                if attempt > 1 {
                    tracing::info!(attempt, "retrying reconciliation pass");
                }
                self.reconcile(changeset, cancel).await
            })
            .await;
        if outcome.had_retries() {
            tracing::debug!(
                attempts = outcome.attempts,
                waited_ms = outcome.total_retry_delay.as_millis() as u64,
                "reconciliation retried"
            );
        }
        outcome.into_result()
    }

    /// Changeset covering the device index and the whole desired set
    pub async fn full_changeset(&self) -> Result<Changeset, LodestarError> {
        let index = self.generations.load_device_index().await?;
        let desired = self.generations.load_desired().await?;
        let mut changeset = Changeset::for_devices(index);
        for doc in sorted(&desired) {
            changeset.merge(Changeset::for_service(doc.name.clone(), None, Some(doc)));
        }
        Ok(changeset)
    }

    async fn run(
        &self,
        changeset: &Changeset,
        cancel: &CancellationToken,
        mode: PassMode,
    ) -> Result<ReconcileReport, LodestarError> {
        let pass_id = Uuid::new_v4();
        let span = tracing::info_span!("reconcile", pass = %pass_id, mode = ?mode);
        self.run_pass(pass_id, changeset, cancel, mode)
            .instrument(span)
            .await
    }

    async fn run_pass(
        &self,
        pass_id: Uuid,
        changeset: &Changeset,
        cancel: &CancellationToken,
        mode: PassMode,
    ) -> Result<ReconcileReport, LodestarError> {
        if cancel.is_cancelled() {
            return Err(LodestarError::cancelled("pass cancelled before loading"));
        }
        let _guards = self.locks.acquire(changeset.devices.keys()).await;
        if cancel.is_cancelled() {
            return Err(LodestarError::cancelled(
                "pass cancelled while waiting for device locks",
            ));
        }

        // Loaded
        let desired = self.generations.load_desired().await?;
        let targets = resolve_targets(changeset, &desired);
        let mut applied: BTreeMap<DeviceId, Vec<PathOp>> = BTreeMap::new();
        let mut actual: BTreeMap<DeviceId, Vec<PathOp>> = BTreeMap::new();
        for device in targets.keys() {
            applied.insert(device.clone(), self.generations.load_applied_ops(device).await?);
            if let Some(snapshot) = self
                .generations
                .load_generation(device, Generation::Actual)
                .await?
            {
                actual.insert(device.clone(), snapshot.ops);
            }
        }
        let mut report = ReconcileReport::new(pass_id, targets.keys().cloned().collect());
        tracing::debug!(
            phase = %report.phase,
            services = desired.len(),
            devices = targets.len(),
            "state loaded"
        );

        // Built
        let build = self.builder.build_report(&desired);
        report.conflicts = build.conflicts.clone();
        report.phase = PassPhase::Built;
        tracing::debug!(
            phase = %report.phase,
            ops = build.path_map.op_count(),
            conflicts = report.conflicts.len(),
            "path map built"
        );

        // Diffed
        let mut plans = Vec::with_capacity(targets.len());
        for (device, protocol) in &targets {
            let desired_ops = build.path_map.ops(device).to_vec();
            let applied_ops = applied.remove(device).unwrap_or_default();
            let to_push = diff_device(&desired_ops, &applied_ops);

            if let Some(live) = actual.get(device) {
                let drift = detect_drift(&applied_ops, live);
                if !drift.is_empty() {
                    tracing::warn!(
                        device = %device,
                        unexpected = drift.unexpected.len(),
                        missing = drift.missing.len(),
                        "device drifted since last sync"
                    );
                    report.drift.insert(device.clone(), drift);
                }
            }
            if !to_push.is_empty() {
                report.planned.insert(device.clone(), to_push.clone());
            }
            plans.push(DevicePlan {
                target: DeviceTarget::new(device.clone(), *protocol),
                commit: desired_ops != applied_ops,
                desired: desired_ops,
                to_push,
            });
        }
        report.phase = PassPhase::Diffed;
        tracing::debug!(
            phase = %report.phase,
            planned_devices = report.planned.len(),
            planned_ops = report.planned_op_count(),
            "diff computed"
        );

        if mode == PassMode::Plan {
            return Ok(report);
        }
        if cancel.is_cancelled() {
            tracing::info!("pass cancelled before the first push");
            report.cancelled = targets.keys().cloned().collect();
            report.phase = PassPhase::Failed;
            return Ok(report);
        }

        // Applying
        report.phase = PassPhase::Applying;
        let outcomes: Vec<(DeviceId, DeviceOutcome)> = stream::iter(plans)
            .map(|plan| self.apply_device(plan, pass_id, cancel))
            .buffer_unordered(self.config.max_concurrent_pushes)
            .collect()
            .await;

        for (device, outcome) in outcomes {
            match outcome {
                DeviceOutcome::Cancelled => {
                    report.cancelled.insert(device);
                }
                DeviceOutcome::Failed { error, pushed } => {
                    tracing::warn!(device = %device, error = %error, "device failed");
                    if pushed {
                        report.pushed.insert(device.clone());
                    }
                    report.errors.insert(device, error);
                }
                DeviceOutcome::Converged { pushed, warning } => {
                    if pushed {
                        report.pushed.insert(device.clone());
                    }
                    report.warnings.extend(warning);
                    report.converged.insert(device);
                }
            }
        }

        self.record_devices(&targets, &report.converged, &mut report.warnings)
            .await;
        self.record_outputs(changeset, &desired, build.per_service, &mut report.warnings)
            .await;

        report.phase = if report.errors.is_empty() && report.cancelled.is_empty() {
            PassPhase::Committed
        } else {
            PassPhase::Failed
        };
        tracing::info!(phase = %report.phase, "{}", report.summary());
        Ok(report)
    }

    #[tracing::instrument(skip_all, fields(device = %plan.target.id))]
    async fn apply_device(
        &self,
        plan: DevicePlan,
        pass_id: Uuid,
        cancel: &CancellationToken,
    ) -> (DeviceId, DeviceOutcome) {
        let device = plan.target.id.clone();
        if cancel.is_cancelled() {
            return (device, DeviceOutcome::Cancelled);
        }

        let pushed = !plan.to_push.is_empty();
        if pushed {
            let write = tokio::time::timeout(
                self.config.push_timeout(),
                self.adapter.write(&plan.target, &plan.to_push),
            )
            .await;
            let error = match write {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(_) => Some(DeviceError::Timeout {
                    device: device.clone(),
                    after_ms: self.config.push_timeout_ms,
                }),
            };
            if let Some(error) = error {
                return (
                    device,
                    DeviceOutcome::Failed {
                        error: error.into(),
                        pushed: false,
                    },
                );
            }
            tracing::debug!(ops = plan.to_push.len(), "pushed");
        }

        if plan.commit {
            let snapshot = GenerationSnapshot::new(
                device.clone(),
                Generation::Applied,
                plan.desired,
                Some(pass_id),
            );
            if let Err(error) = self.generations.save_generation(&snapshot).await {
                return (device, DeviceOutcome::Failed { error, pushed });
            }
        }

        let mut warning = None;
        if pushed && self.config.refresh_actual_after_push {
            if let Err(err) = self.drift.sync_locked(&plan.target, Some(pass_id)).await {
                tracing::warn!(error = %err, "actual refresh failed");
                warning = Some(format!("{device}: actual refresh failed: {err}"));
            }
        }
        (device, DeviceOutcome::Converged { pushed, warning })
    }

    async fn record_devices(
        &self,
        targets: &BTreeMap<DeviceId, ProtocolKind>,
        converged: &BTreeSet<DeviceId>,
        warnings: &mut Vec<String>,
    ) {
        let mut index = match self.generations.load_device_index().await {
            Ok(index) => index,
            Err(err) => {
                warnings.push(format!("device index not updated: {err}"));
                return;
            }
        };
        let before = index.clone();
        for device in converged {
            if let Some(protocol) = targets.get(device) {
                index.insert(device.clone(), *protocol);
            }
        }
        if index == before {
            return;
        }
        if let Err(err) = self.generations.save_device_index(&index).await {
            tracing::warn!(error = %err, "device index write failed");
            warnings.push(format!("device index not updated: {err}"));
        }
    }

    async fn record_outputs(
        &self,
        changeset: &Changeset,
        desired: &[ServiceDocument],
        mut per_service: BTreeMap<ServiceName, PathMap>,
        warnings: &mut Vec<String>,
    ) {
        let services: BTreeSet<ServiceName> = if changeset.services.is_empty() {
            desired.iter().map(|doc| doc.name.clone()).collect()
        } else {
            changeset.services.clone()
        };
        for name in services {
            let output = per_service.remove(&name).unwrap_or_default();
            match self.generations.load_service_output(&name).await {
                Ok(Some(previous)) if previous == output => continue,
                Ok(_) => {}
                Err(err) => {
                    warnings.push(format!("{name}: output not recorded: {err}"));
                    continue;
                }
            }
            if let Err(err) = self.generations.save_service_output(&name, &output).await {
                tracing::warn!(service = %name, error = %err, "output write failed");
                warnings.push(format!("{name}: output not recorded: {err}"));
            }
        }
    }
}

fn sorted(docs: &[ServiceDocument]) -> Vec<&ServiceDocument> {
    let mut ordered: Vec<&ServiceDocument> = docs.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));
    ordered
}

/// Protocol per affected device
///
/// The entry of the last document by name that names the device decides;
/// devices no document names keep the changeset's protocol.
fn resolve_targets(
    changeset: &Changeset,
    desired: &[ServiceDocument],
) -> BTreeMap<DeviceId, ProtocolKind> {
    let mut named: BTreeMap<DeviceId, ProtocolKind> = BTreeMap::new();
    for doc in sorted(desired) {
        named.extend(doc.devices());
    }
    changeset
        .devices
        .iter()
        .map(|(device, protocol)| {
            let protocol = named.get(device).copied().unwrap_or(*protocol);
            (device.clone(), protocol)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_core::ServiceEntry;

    #[test]
    fn test_desired_protocol_overrides_changeset() {
        let docs = vec![
            ServiceDocument::new("b")
                .with_entry(ServiceEntry::new("d1", ProtocolKind::Gnmi)),
            ServiceDocument::new("a")
                .with_entry(ServiceEntry::new("d1", ProtocolKind::Netconf)),
        ];
        let changeset = Changeset::for_devices([
            (DeviceId::new("d1"), ProtocolKind::Netconf),
            (DeviceId::new("d2"), ProtocolKind::Gnmi),
        ]);
        let targets = resolve_targets(&changeset, &docs);
        assert_eq!(targets[&DeviceId::new("d1")], ProtocolKind::Gnmi);
        assert_eq!(targets[&DeviceId::new("d2")], ProtocolKind::Gnmi);
    }
}
