//! Multi-device engine fixtures

use crate::driver::MemoryDriver;
use crate::store::FlakyStore;
use lodestar_core::{
    DeviceId, DeviceTarget, LodestarError, PathOp, ProtocolKind, SchemaRegistry, ServiceDocument,
    ServiceEntry, ServiceName, ServicePatch,
};
use lodestar_devices::{DriverRegistry, TranslatingAdapter};
use lodestar_intent::{Changeset, IntentStore};
use lodestar_reconcile::{ReconcileConfig, ReconcileEngine, ReconcileReport};
use lodestar_store::{Generation, GenerationStore, MemoryVersionedStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A complete in-memory Lodestar: store, intent store, devices and engine
pub struct EngineFixture {
    /// Store with fault injection over an in-memory store
    pub store: FlakyStore,
    /// Generation layout over `store`
    pub generations: GenerationStore,
    /// Intent Store sharing `generations`
    pub intents: IntentStore,
    /// Devices behind the adapter
    pub driver: MemoryDriver,
    /// Engine under test
    pub engine: ReconcileEngine,
    /// Devices of the fixture, in creation order
    pub devices: Vec<DeviceTarget>,
}

impl EngineFixture {
    /// Fixture over `devices` with `config`
    pub fn new(devices: Vec<DeviceTarget>, config: ReconcileConfig) -> Result<Self, LodestarError> {
        let store = FlakyStore::new(Arc::new(MemoryVersionedStore::new()));
        let generations = GenerationStore::new(Arc::new(store.clone()));
        let schemas = Arc::new(SchemaRegistry::with_builtins());
        let intents = IntentStore::new(generations.clone(), Arc::clone(&schemas));

        let driver = MemoryDriver::new(ProtocolKind::Netconf);
        let drivers = DriverRegistry::new()
            .with_driver(Arc::new(driver.clone()))
            .with_driver(Arc::new(driver.for_protocol(ProtocolKind::Gnmi)));
        let adapter = Arc::new(TranslatingAdapter::new(drivers));
        let engine = ReconcileEngine::new(generations.clone(), adapter, schemas, config)?;

        Ok(Self {
            store,
            generations,
            intents,
            driver,
            engine,
            devices,
        })
    }

    /// Two NETCONF devices and one gNMI device (most common scenario)
    pub fn trio() -> Result<Self, LodestarError> {
        Self::trio_with_config(ReconcileConfig::default())
    }

    /// `trio` with a custom engine configuration
    pub fn trio_with_config(config: ReconcileConfig) -> Result<Self, LodestarError> {
        Self::new(
            vec![
                DeviceTarget::new("cassini1", ProtocolKind::Netconf),
                DeviceTarget::new("cassini2", ProtocolKind::Netconf),
                DeviceTarget::new("cassini3", ProtocolKind::Gnmi),
            ],
            config,
        )
    }

    /// Id of the `index`th fixture device
    pub fn device(&self, index: usize) -> &DeviceId {
        &self.devices[index].id
    }

    /// Entry for the `index`th device with the given ports
    pub fn entry(&self, index: usize, up: &[&str], down: &[&str]) -> ServiceEntry {
        let target = &self.devices[index];
        ServiceEntry::new(target.id.clone(), target.protocol)
            .with_up(up.iter().copied())
            .with_down(down.iter().copied())
    }

    /// POST a whole document
    pub async fn submit(&self, doc: ServiceDocument) -> Result<Changeset, LodestarError> {
        self.intents.submit(&ServicePatch::from(doc)).await
    }

    /// DELETE a document
    pub async fn delete(&self, name: &str) -> Result<Changeset, LodestarError> {
        self.intents.delete(&ServiceName::new(name)).await
    }

    /// Run a pass that cannot be cancelled
    pub async fn reconcile(&self, changeset: &Changeset) -> Result<ReconcileReport, LodestarError> {
        self.engine
            .reconcile(changeset, &CancellationToken::new())
            .await
    }

    /// Submit then reconcile the resulting changeset
    pub async fn apply(&self, doc: ServiceDocument) -> Result<ReconcileReport, LodestarError> {
        let changeset = self.submit(doc).await?;
        self.reconcile(&changeset).await
    }

    /// Changeset naming every fixture device
    pub fn all_devices(&self) -> Changeset {
        Changeset::for_devices(self.devices.iter().map(|t| (t.id.clone(), t.protocol)))
    }

    /// Applied ops of a device
    pub async fn applied(&self, device: &DeviceId) -> Result<Vec<PathOp>, LodestarError> {
        self.generations.load_applied_ops(device).await
    }

    /// Actual ops of a device, `None` if never synced
    pub async fn actual(&self, device: &DeviceId) -> Result<Option<Vec<PathOp>>, LodestarError> {
        Ok(self
            .generations
            .load_generation(device, Generation::Actual)
            .await?
            .map(|snapshot| snapshot.ops))
    }

    /// Live device configuration as normalized leaves
    pub fn device_state(&self, device: &DeviceId) -> Vec<PathOp> {
        self.driver.state_ops(device)
    }
}
