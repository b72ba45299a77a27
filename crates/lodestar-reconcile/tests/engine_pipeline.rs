//! End-to-end reconciliation passes over the in-memory trio

use lodestar_core::{
    ErrorClass, LodestarError, PathOp, PortId, ServiceDocument, ServiceName, ServiceSchema,
    StoreError,
};
use lodestar_reconcile::{detect_drift, PassPhase};
use lodestar_store::{Generation, GenerationStore};
use lodestar_testkit::EngineFixture;
use std::collections::BTreeSet;

fn deletes(ports: &[&str]) -> Vec<PathOp> {
    let schema = ServiceSchema::interfaces();
    ports
        .iter()
        .map(|p| schema.down_op(&PortId::new(*p)))
        .collect()
}

async fn applied_revisions(fx: &EngineFixture, index: usize) -> usize {
    let path = GenerationStore::generation_path(fx.device(index), Generation::Applied).unwrap();
    fx.generations.history(&path).await.unwrap().len()
}

#[tokio::test]
async fn test_ports_going_down_push_only_new_deletes() {
    let fx = EngineFixture::trio().unwrap();
    let first = fx
        .apply(ServiceDocument::new("interfaces").with_entry(fx.entry(
            0,
            &["oe1", "oe2", "oe3"],
            &["oe4", "oe5"],
        )))
        .await
        .unwrap();
    assert_eq!(first.phase, PassPhase::Committed);
    assert_eq!(first.planned[fx.device(0)].len(), 2 + 6);

    let second = fx
        .apply(ServiceDocument::new("interfaces").with_entry(fx.entry(
            0,
            &[],
            &["oe1", "oe2", "oe3", "oe4", "oe5"],
        )))
        .await
        .unwrap();
    assert_eq!(second.phase, PassPhase::Committed);
    assert_eq!(second.planned[fx.device(0)], deletes(&["oe1", "oe2", "oe3"]));
    assert!(fx.device_state(fx.device(0)).is_empty());
}

#[tokio::test]
async fn test_deleting_sole_document_retracts_everything() {
    let fx = EngineFixture::trio().unwrap();
    fx.apply(
        ServiceDocument::new("interfaces").with_entry(fx.entry(1, &["oe1", "oe2"], &[])),
    )
    .await
    .unwrap();
    assert_eq!(fx.device_state(fx.device(1)).len(), 4);

    let changeset = fx.delete("interfaces").await.unwrap();
    let report = fx.reconcile(&changeset).await.unwrap();

    let pushed = &report.planned[fx.device(1)];
    assert_eq!(pushed.len(), 4);
    assert!(pushed.iter().all(PathOp::is_delete));
    assert!(fx.applied(fx.device(1)).await.unwrap().is_empty());
    assert!(fx.device_state(fx.device(1)).is_empty());
    assert!(report.converged.contains(fx.device(1)));
}

#[tokio::test]
async fn test_delete_survives_failed_index_write() {
    let fx = EngineFixture::trio().unwrap();
    fx.apply(ServiceDocument::new("interfaces").with_entry(fx.entry(0, &["oe1"], &[])))
        .await
        .unwrap();

    fx.store.fail_puts_under("/Services/all.json");
    let err = fx.delete("interfaces").await.unwrap_err();
    assert!(matches!(err, LodestarError::Store(StoreError::Unavailable { .. })));
    assert!(fx.engine.full_changeset().await.is_ok());

    fx.store.clear_faults();
    let changeset = fx.delete("interfaces").await.unwrap();
    assert!(changeset.devices.contains_key(fx.device(0)));
    let report = fx.engine.reconcile_all(&Default::default()).await.unwrap();
    assert!(report.is_success());
    assert!(fx.applied(fx.device(0)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_clears_index_entry_of_tombstoned_document() {
    let fx = EngineFixture::trio().unwrap();
    fx.submit(ServiceDocument::new("interfaces").with_entry(fx.entry(0, &["oe1"], &[])))
        .await
        .unwrap();
    let name = ServiceName::new("interfaces");
    fx.generations.delete_service(&name).await.unwrap();
    assert!(fx.generations.load_desired().await.is_err());

    let changeset = fx.delete("interfaces").await.unwrap();
    assert!(changeset.devices.is_empty());
    assert!(fx.generations.load_desired().await.unwrap().is_empty());
    assert!(matches!(
        fx.delete("interfaces").await,
        Err(LodestarError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let fx = EngineFixture::trio().unwrap();
    let doc = ServiceDocument::new("interfaces")
        .with_entry(fx.entry(0, &["oe1"], &["oe2"]))
        .with_entry(fx.entry(2, &["oe3"], &[]));
    let changeset = fx.submit(doc).await.unwrap();
    fx.reconcile(&changeset).await.unwrap();
    let writes = fx.driver.total_writes();
    let revisions = applied_revisions(&fx, 0).await;

    let again = fx.reconcile(&changeset).await.unwrap();
    assert_eq!(again.phase, PassPhase::Committed);
    assert!(again.planned.is_empty());
    assert!(again.pushed.is_empty());
    assert_eq!(fx.driver.total_writes(), writes);
    assert_eq!(applied_revisions(&fx, 0).await, revisions);
}

#[tokio::test]
async fn test_converged_devices_match_path_map() {
    let fx = EngineFixture::trio().unwrap();
    let doc = ServiceDocument::new("interfaces")
        .with_entry(fx.entry(0, &["oe1", "oe2"], &["oe3"]))
        .with_entry(fx.entry(1, &["oe1"], &[]))
        .with_entry(fx.entry(2, &[], &["oe9"]));
    let report = fx.apply(doc).await.unwrap();
    assert_eq!(report.converged.len(), 3);

    for index in 0..3 {
        let device = fx.device(index);
        let applied = fx.applied(device).await.unwrap();
        assert!(detect_drift(&applied, &fx.device_state(device)).is_empty());
        assert_eq!(fx.actual(device).await.unwrap().is_some(), report.pushed.contains(device));
    }
}

#[tokio::test]
async fn test_one_failing_device_does_not_block_the_rest() {
    let fx = EngineFixture::trio().unwrap();
    fx.driver.fail_device(fx.device(1));
    let doc = ServiceDocument::new("interfaces")
        .with_entry(fx.entry(0, &["oe1"], &[]))
        .with_entry(fx.entry(1, &["oe1"], &[]))
        .with_entry(fx.entry(2, &["oe1"], &[]));
    let changeset = fx.submit(doc).await.unwrap();

    let report = fx.reconcile(&changeset).await.unwrap();
    assert_eq!(report.phase, PassPhase::Failed);
    assert_eq!(report.class(), Some(ErrorClass::Server));
    assert_eq!(
        report.errors.keys().collect::<Vec<_>>(),
        vec![fx.device(1)]
    );
    assert_eq!(
        report.converged,
        BTreeSet::from([fx.device(0).clone(), fx.device(2).clone()])
    );
    assert!(fx.applied(fx.device(1)).await.unwrap().is_empty());

    fx.driver.clear_faults();
    let retry = fx.reconcile(&changeset).await.unwrap();
    assert_eq!(retry.phase, PassPhase::Committed);
    assert_eq!(retry.pushed, BTreeSet::from([fx.device(1).clone()]));
}

#[tokio::test]
async fn test_rejected_write_keeps_old_applied() {
    let fx = EngineFixture::trio().unwrap();
    fx.apply(ServiceDocument::new("interfaces").with_entry(fx.entry(0, &["oe1"], &[])))
        .await
        .unwrap();
    let before = fx.applied(fx.device(0)).await.unwrap();

    fx.driver.reject_writes(fx.device(0));
    let report = fx
        .apply(ServiceDocument::new("interfaces").with_entry(fx.entry(0, &["oe1", "oe2"], &[])))
        .await
        .unwrap();
    assert!(matches!(
        report.errors[fx.device(0)],
        LodestarError::Device(lodestar_core::DeviceError::Rejected { .. })
    ));
    assert_eq!(fx.applied(fx.device(0)).await.unwrap(), before);
}

#[tokio::test]
async fn test_failed_commit_is_reported_per_device() {
    let fx = EngineFixture::trio().unwrap();
    fx.store.fail_puts_under("/Devices/cassini1/applied");
    let doc = ServiceDocument::new("interfaces")
        .with_entry(fx.entry(0, &["oe1"], &[]))
        .with_entry(fx.entry(1, &["oe1"], &[]));
    let report = fx.apply(doc).await.unwrap();

    assert!(report.pushed.contains(fx.device(0)));
    assert!(matches!(
        report.errors[fx.device(0)],
        LodestarError::Store(StoreError::Unavailable { .. })
    ));
    assert!(report.converged.contains(fx.device(1)));
    assert!(fx.applied(fx.device(0)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plan_has_no_side_effects() {
    let fx = EngineFixture::trio().unwrap();
    let changeset = fx
        .submit(ServiceDocument::new("interfaces").with_entry(fx.entry(2, &["oe1"], &["oe2"])))
        .await
        .unwrap();

    let plan = fx.engine.plan(&changeset).await.unwrap();
    assert_eq!(plan.phase, PassPhase::Diffed);
    assert_eq!(plan.planned[fx.device(2)].len(), 3);
    assert_eq!(fx.driver.total_writes(), 0);
    assert!(fx.applied(fx.device(2)).await.unwrap().is_empty());
    assert!(fx.generations.load_device_index().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_all_covers_desired_and_indexed_devices() {
    let fx = EngineFixture::trio().unwrap();
    fx.apply(ServiceDocument::new("interfaces").with_entry(fx.entry(0, &["oe1"], &[])))
        .await
        .unwrap();
    fx.submit(ServiceDocument::new("transceivers").with_entry(fx.entry(2, &["oe1"], &[])))
        .await
        .unwrap();

    let report = fx
        .engine
        .reconcile_all(&Default::default())
        .await
        .unwrap();
    assert_eq!(
        report.affected_devices,
        BTreeSet::from([fx.device(0).clone(), fx.device(2).clone()])
    );
    assert_eq!(report.pushed, BTreeSet::from([fx.device(2).clone()]));

    let index = fx.generations.load_device_index().await.unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index[fx.device(2)], fx.devices[2].protocol);
}

#[tokio::test]
async fn test_outputs_record_each_service_contribution() {
    let fx = EngineFixture::trio().unwrap();
    fx.apply(ServiceDocument::new("interfaces").with_entry(fx.entry(0, &["oe1"], &[])))
        .await
        .unwrap();

    let name = ServiceName::new("interfaces");
    let output = fx
        .generations
        .load_service_output(&name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output.ops(fx.device(0)).len(), 2);

    let changeset = fx.delete("interfaces").await.unwrap();
    fx.reconcile(&changeset).await.unwrap();
    let output = fx
        .generations
        .load_service_output(&name)
        .await
        .unwrap()
        .unwrap();
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_conflicting_documents_last_name_wins() {
    let fx = EngineFixture::trio().unwrap();
    fx.submit(
        ServiceDocument::new("a-uplinks")
            .with_schema("interfaces")
            .with_entry(fx.entry(0, &["oe1"], &[])),
    )
    .await
    .unwrap();
    let changeset = fx
        .submit(
            ServiceDocument::new("b-maintenance")
                .with_schema("interfaces")
                .with_entry(fx.entry(0, &[], &["oe1"])),
        )
        .await
        .unwrap();

    let report = fx.reconcile(&changeset).await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].winner.as_str(), "b-maintenance");
    assert_eq!(fx.applied(fx.device(0)).await.unwrap(), deletes(&["oe1"]));
}
