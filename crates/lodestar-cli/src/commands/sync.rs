//! `lodestar sync` and `lodestar watch`

use super::print_json;
use crate::context::CliContext;
use anyhow::Result;
use lodestar_core::{DeviceError, DeviceId, DeviceTarget, ErrorClass};
use lodestar_reconcile::SyncReport;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn class_of(report: &SyncReport) -> Option<ErrorClass> {
    (!report.errors.is_empty()).then_some(ErrorClass::Server)
}

/// Read devices into the actual generation and print drift
pub async fn handle_sync(devices: Vec<String>, ctx: &CliContext) -> Result<Option<ErrorClass>> {
    let index = ctx.generations.load_device_index().await?;
    let targets: Vec<DeviceTarget> = if devices.is_empty() {
        index
            .into_iter()
            .map(|(id, protocol)| DeviceTarget::new(id, protocol))
            .collect()
    } else {
        devices
            .into_iter()
            .map(DeviceId::new)
            .map(|id| match index.get(&id) {
                Some(protocol) => Ok(DeviceTarget::new(id, *protocol)),
                None => Err(DeviceError::UnknownDevice(id)),
            })
            .collect::<Result<_, _>>()?
    };

    let report = ctx.engine.drift_detector().sync_actual(&targets).await;
    print_json(&report)?;
    Ok(class_of(&report))
}

/// Sync every indexed device on an interval until cancelled
pub async fn handle_watch(
    interval_secs: Option<u64>,
    ctx: &CliContext,
    cancel: CancellationToken,
) -> Result<Option<ErrorClass>> {
    let interval = interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.drift.interval());
    tracing::info!(interval_secs = interval.as_secs(), "watching for drift");

    ctx.engine
        .drift_detector()
        .watch(interval, cancel, |round| match round {
            Ok(report) => {
                for (device, drift) in &report.conflicts {
                    tracing::warn!(
                        device = %device,
                        unexpected = drift.unexpected.len(),
                        missing = drift.missing.len(),
                        "drift"
                    );
                }
                for (device, err) in &report.errors {
                    tracing::error!(device = %device, error = %err, "sync failed");
                }
            }
            Err(err) => tracing::error!(error = %err, "sync round failed"),
        })
        .await;
    Ok(None)
}
