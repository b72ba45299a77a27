//! Locking, cancellation, timeouts, bounded fan-out and pass retry

use lodestar_core::{
    DeviceError, DeviceTarget, LodestarError, ProtocolKind, RetryPolicy, ServiceDocument,
    ServiceEntry, StoreError,
};
use lodestar_reconcile::{PassPhase, ReconcileConfig};
use lodestar_testkit::EngineFixture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn all_up(fx: &EngineFixture) -> ServiceDocument {
    (0..fx.devices.len()).fold(ServiceDocument::new("interfaces"), |doc, index| {
        doc.with_entry(fx.entry(index, &["oe1"], &[]))
    })
}

#[tokio::test]
async fn test_cancelled_before_start_has_no_side_effects() {
    let fx = EngineFixture::trio().unwrap();
    let changeset = fx.submit(all_up(&fx)).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = fx.engine.reconcile(&changeset, &cancel).await.unwrap_err();
    assert!(matches!(err, LodestarError::Cancelled { .. }));
    assert_eq!(fx.driver.total_writes(), 0);
    assert!(fx.generations.load_device_index().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_apply_skips_devices_not_started() {
    let config = ReconcileConfig {
        max_concurrent_pushes: 1,
        ..Default::default()
    };
    let fx = EngineFixture::trio_with_config(config).unwrap();
    fx.driver.set_write_delay(Duration::from_millis(100));
    let changeset = fx.submit(all_up(&fx)).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        }
    };
    let (report, ()) = tokio::join!(fx.engine.reconcile(&changeset, &cancel), trigger);
    let report = report.unwrap();

    assert_eq!(report.phase, PassPhase::Failed);
    assert_eq!(report.converged.len(), 1);
    assert_eq!(report.cancelled.len(), 2);
    assert!(report.errors.is_empty());
    assert_eq!(fx.driver.total_writes(), 1);
    for device in &report.cancelled {
        assert!(fx.applied(device).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_pass_waits_for_held_device_lock() {
    let fx = EngineFixture::trio().unwrap();
    let changeset = fx.submit(all_up(&fx)).await.unwrap();

    let guard = fx.engine.locks().acquire([fx.device(1)]).await;
    let blocked =
        tokio::time::timeout(Duration::from_millis(100), fx.reconcile(&changeset)).await;
    assert!(blocked.is_err());
    assert_eq!(fx.driver.total_writes(), 0);

    drop(guard);
    let report = fx.reconcile(&changeset).await.unwrap();
    assert_eq!(report.phase, PassPhase::Committed);
}

#[tokio::test]
async fn test_disjoint_passes_run_in_parallel() {
    let fx = EngineFixture::trio().unwrap();
    let first = fx
        .submit(ServiceDocument::new("interfaces").with_entry(fx.entry(0, &["oe1"], &[])))
        .await
        .unwrap();
    let second = fx
        .submit(ServiceDocument::new("transceivers").with_entry(fx.entry(2, &["oe1"], &[])))
        .await
        .unwrap();

    let _held = fx.engine.locks().acquire([fx.device(1)]).await;
    let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(fx.reconcile(&first), fx.reconcile(&second))
    })
    .await
    .unwrap();
    assert!(a.unwrap().is_success());
    assert!(b.unwrap().is_success());
}

#[tokio::test]
async fn test_hung_push_times_out_alone() {
    let config = ReconcileConfig {
        push_timeout_ms: 50,
        ..Default::default()
    };
    let fx = EngineFixture::trio_with_config(config).unwrap();
    fx.driver.hang_device(fx.device(2));

    let report = fx.apply(all_up(&fx)).await.unwrap();
    assert!(matches!(
        report.errors[fx.device(2)],
        LodestarError::Device(DeviceError::Timeout { after_ms: 50, .. })
    ));
    assert_eq!(report.converged.len(), 2);
    assert!(fx.applied(fx.device(2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_push_fan_out_is_bounded() {
    let devices: Vec<DeviceTarget> = (1..=6)
        .map(|i| DeviceTarget::new(format!("leaf{i}"), ProtocolKind::Netconf))
        .collect();
    let config = ReconcileConfig {
        max_concurrent_pushes: 2,
        ..Default::default()
    };
    let fx = EngineFixture::new(devices, config).unwrap();
    fx.driver.set_write_delay(Duration::from_millis(20));

    let doc = fx.devices.iter().fold(ServiceDocument::new("interfaces"), |doc, t| {
        doc.with_entry(ServiceEntry::new(t.id.clone(), t.protocol).with_up(["oe1"]))
    });
    let report = fx.apply(doc).await.unwrap();
    assert!(report.is_success());
    assert_eq!(fx.driver.total_writes(), 6);
    assert!(fx.driver.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_transient_store_failure_is_retried() {
    let fx = EngineFixture::trio().unwrap();
    let changeset = fx.submit(all_up(&fx)).await.unwrap();
    let policy = RetryPolicy::fixed(Duration::from_millis(1)).with_max_attempts(3);

    fx.store.fail_next(1);
    let report = fx
        .engine
        .reconcile_with_retry(&changeset, &policy, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success());

    fx.store.fail_next(1);
    let err = fx
        .engine
        .reconcile_with_retry(&changeset, &RetryPolicy::no_retry(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LodestarError::Store(StoreError::Unavailable { .. })));
}

#[tokio::test]
async fn test_hung_refresh_read_times_out() {
    let config = ReconcileConfig {
        push_timeout_ms: 50,
        ..Default::default()
    };
    let fx = EngineFixture::trio_with_config(config).unwrap();
    fx.driver.hang_reads_after_push(fx.device(0));

    let report = tokio::time::timeout(
        Duration::from_secs(2),
        fx.apply(ServiceDocument::new("interfaces").with_entry(fx.entry(0, &["oe1"], &[]))),
    )
    .await
    .expect("pass must not hang on the refresh read")
    .unwrap();

    assert!(report.converged.contains(fx.device(0)));
    assert!(report.warnings.iter().any(|w| w.contains("refresh")));
    assert!(!fx.applied(fx.device(0)).await.unwrap().is_empty());
    assert!(fx.actual(fx.device(0)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_hung_sync_read_is_isolated() {
    let config = ReconcileConfig {
        push_timeout_ms: 50,
        ..Default::default()
    };
    let fx = EngineFixture::trio_with_config(config).unwrap();
    fx.driver.hang_reads(fx.device(1));

    let report = tokio::time::timeout(
        Duration::from_secs(2),
        fx.engine.drift_detector().sync_actual(&fx.devices),
    )
    .await
    .expect("sync must not hang on one device");

    assert!(matches!(
        report.errors[fx.device(1)],
        LodestarError::Device(DeviceError::Timeout { after_ms: 50, .. })
    ));
    assert_eq!(report.updated.len(), 2);

    fx.driver.clear_faults();
    let pass = tokio::time::timeout(Duration::from_secs(2), fx.apply(all_up(&fx)))
        .await
        .expect("locks are released after a timed-out read")
        .unwrap();
    assert!(pass.is_success());
}
