//! Wiring from configuration to running components

use crate::config::{LodestarConfig, StoreBackend};
use anyhow::{Context as _, Result};
use lodestar_core::{ProtocolKind, VersionedStore};
use lodestar_devices::{DriverRegistry, FileDriver, TranslatingAdapter};
use lodestar_intent::IntentStore;
use lodestar_reconcile::ReconcileEngine;
use lodestar_store::{FilesystemVersionedStore, GenerationStore, MemoryVersionedStore};
use std::sync::Arc;

/// Everything a command may need
pub struct CliContext {
    /// Loaded configuration
    pub config: LodestarConfig,
    /// Desired/applied/actual layout
    pub generations: GenerationStore,
    /// Intent Store
    pub intents: IntentStore,
    /// Reconciliation engine
    pub engine: ReconcileEngine,
}

impl CliContext {
    /// Open the store and build the engine described by `config`
    pub async fn open(config: LodestarConfig) -> Result<Self> {
        let store: Arc<dyn VersionedStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryVersionedStore::new()),
            StoreBackend::Filesystem => Arc::new(
                FilesystemVersionedStore::open(&config.store.root)
                    .await
                    .with_context(|| {
                        format!("Failed to open store at {}", config.store.root.display())
                    })?,
            ),
        };
        let generations = GenerationStore::new(store);
        let schemas = Arc::new(config.schema_registry()?);

        let drivers = ProtocolKind::ALL.iter().fold(DriverRegistry::new(), |registry, protocol| {
            registry.with_driver(Arc::new(FileDriver::new(&config.devices.root, *protocol)))
        });
        let adapter = Arc::new(TranslatingAdapter::new(drivers));

        let intents = IntentStore::new(generations.clone(), Arc::clone(&schemas));
        let engine = ReconcileEngine::new(
            generations.clone(),
            adapter,
            schemas,
            config.reconcile.clone(),
        )?;

        tracing::debug!(
            backend = ?config.store.backend,
            devices = %config.devices.root.display(),
            "context ready"
        );
        Ok(Self {
            config,
            generations,
            intents,
            engine,
        })
    }
}
