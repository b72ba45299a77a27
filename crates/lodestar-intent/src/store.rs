//! Intent Store: owner of the desired generation

use crate::changeset::Changeset;
use lodestar_core::{
    LodestarError, SchemaRegistry, ServiceDocument, ServiceName, ServicePatch, WriteMode,
};
use lodestar_store::{GenerationStore, ServiceIndex};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Validated CRUD over service documents
///
/// Every mutation validates first, writes a new revision of the document,
/// keeps `/Services/all.json` in step and returns the affected devices.
/// Mutations are serialized so the index never loses an update.
#[derive(Clone)]
pub struct IntentStore {
    generations: GenerationStore,
    schemas: Arc<SchemaRegistry>,
    write_lock: Arc<Mutex<()>>,
}

impl IntentStore {
    /// Intent store over a generation layout
    pub fn new(generations: GenerationStore, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            generations,
            schemas,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Schemas documents are validated against
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// POST: merge `patch` into the stored document field-wise per entry,
    /// creating the document if needed
    pub async fn submit(&self, patch: &ServicePatch) -> Result<Changeset, LodestarError> {
        let _guard = self.write_lock.lock().await;
        let before = self.generations.load_service(&patch.name).await?;
        let after = patch.apply_to(before.as_ref())?;
        after.validate(&self.schemas)?;

        let mode = if before.is_some() {
            WriteMode::Update
        } else {
            WriteMode::CreateSafe
        };
        let revision = self.generations.save_service(&after, mode).await?;
        self.index_insert(&after.name).await?;

        tracing::info!(service = %after.name, seq = revision.seq, created = before.is_none(), "submitted service");
        Ok(Changeset::for_service(
            after.name.clone(),
            before.as_ref(),
            Some(&after),
        ))
    }

    /// PUT: replace an existing document wholesale
    pub async fn replace(&self, doc: &ServiceDocument) -> Result<Changeset, LodestarError> {
        doc.validate(&self.schemas)?;
        let _guard = self.write_lock.lock().await;
        let before = self
            .generations
            .load_service(&doc.name)
            .await?
            .ok_or_else(|| LodestarError::not_found(format!("service {}", doc.name)))?;

        let revision = self.generations.save_service(doc, WriteMode::Update).await?;
        tracing::info!(service = %doc.name, seq = revision.seq, "replaced service");
        Ok(Changeset::for_service(doc.name.clone(), Some(&before), Some(doc)))
    }

    /// DELETE: tombstone a document; its devices lose what it contributed
    pub async fn delete(&self, name: &ServiceName) -> Result<Changeset, LodestarError> {
        let _guard = self.write_lock.lock().await;
        let before = self.generations.load_service(name).await?;
        let mut index = self.generations.load_service_index().await?;
        let indexed = index.remove(name);

        let Some(before) = before else {
            if !indexed {
                return Err(LodestarError::not_found(format!("service {name}")));
            }
            // Tombstoned by an earlier delete whose index write failed
            self.generations.save_service_index(&index).await?;
            tracing::warn!(service = %name, "removed stale index entry");
            return Ok(Changeset::for_service(name.clone(), None, None));
        };

        // Unindex before tombstoning; a retry still finds the live document
        if indexed {
            self.generations.save_service_index(&index).await?;
        }
        let revision = self.generations.delete_service(name).await?;

        tracing::info!(service = %name, seq = revision.seq, "deleted service");
        Ok(Changeset::for_service(name.clone(), Some(&before), None))
    }

    /// One document
    pub async fn get(&self, name: &ServiceName) -> Result<Option<ServiceDocument>, LodestarError> {
        self.generations.load_service(name).await
    }

    /// Names of every document
    pub async fn list(&self) -> Result<ServiceIndex, LodestarError> {
        self.generations.load_service_index().await
    }

    /// The full desired set
    pub async fn load_all(&self) -> Result<Vec<ServiceDocument>, LodestarError> {
        self.generations.load_desired().await
    }

    async fn index_insert(&self, name: &ServiceName) -> Result<(), LodestarError> {
        let mut index = self.generations.load_service_index().await?;
        if index.insert(name.clone()) {
            self.generations.save_service_index(&index).await?;
        }
        Ok(())
    }
}
