//! Service intent documents
//!
//! A `ServiceDocument` is the unit operators submit: a named list of device
//! entries, each saying which ports should be up and which down. Submissions
//! arrive as `ServicePatch`es whose fields are optional so a POST can merge
//! field-wise into the stored document.

use crate::errors::ValidationError;
use crate::identifiers::{DeviceId, PortId, ProtocolKind, ServiceName};
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Desired port state for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Device the entry configures
    pub name: DeviceId,
    /// Ports to bring up
    #[serde(default)]
    pub up: BTreeSet<PortId>,
    /// Ports to take down
    #[serde(default)]
    pub down: BTreeSet<PortId>,
    /// Management protocol of the device
    pub nos: ProtocolKind,
}

impl ServiceEntry {
    /// Entry with no ports
    pub fn new(name: impl Into<DeviceId>, nos: ProtocolKind) -> Self {
        Self {
            name: name.into(),
            up: BTreeSet::new(),
            down: BTreeSet::new(),
            nos,
        }
    }

    /// Builder-style: set the up ports
    pub fn with_up<I, P>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PortId>,
    {
        self.up = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style: set the down ports
    pub fn with_down<I, P>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PortId>,
    {
        self.down = ports.into_iter().map(Into::into).collect();
        self
    }
}

/// A named intent unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDocument {
    /// Document name
    pub name: ServiceName,
    /// Schema to build with; the document name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Entries in submission order
    #[serde(default)]
    pub entries: Vec<ServiceEntry>,
}

impl ServiceDocument {
    /// Empty document
    pub fn new(name: impl Into<ServiceName>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            entries: Vec::new(),
        }
    }

    /// Builder-style: use another schema than the document name
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Builder-style: append an entry
    pub fn with_entry(mut self, entry: ServiceEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Effective schema name
    pub fn schema_name(&self) -> &str {
        self.schema.as_deref().unwrap_or_else(|| self.name.as_str())
    }

    /// Entry for a device
    pub fn entry(&self, device: &DeviceId) -> Option<&ServiceEntry> {
        self.entries.iter().find(|entry| &entry.name == device)
    }

    /// Devices this document touches, with their protocol
    pub fn devices(&self) -> BTreeMap<DeviceId, ProtocolKind> {
        self.entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.nos))
            .collect()
    }

    /// Check document invariants against the known schemas
    pub fn validate(&self, schemas: &SchemaRegistry) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyServiceName);
        }
        if !schemas.contains(self.schema_name()) {
            return Err(ValidationError::UnknownSchema {
                service: self.name.clone(),
                schema: self.schema_name().to_string(),
            });
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.name.is_empty() {
                return Err(ValidationError::EmptyEntryName {
                    service: self.name.clone(),
                });
            }
            if !seen.insert(&entry.name) {
                return Err(ValidationError::DuplicateEntry {
                    service: self.name.clone(),
                    entry: entry.name.clone(),
                });
            }
            let overlap: Vec<PortId> = entry.up.intersection(&entry.down).cloned().collect();
            if !overlap.is_empty() {
                return Err(ValidationError::OverlappingPorts {
                    service: self.name.clone(),
                    entry: entry.name.clone(),
                    ports: overlap,
                });
            }
            if entry.up.iter().chain(&entry.down).any(PortId::is_empty) {
                return Err(ValidationError::Malformed(format!(
                    "service {}: entry {} has a blank port name",
                    self.name, entry.name
                )));
            }
        }
        Ok(())
    }
}

/// Partial entry as submitted; absent fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPatch {
    /// Device the entry configures
    pub name: DeviceId,
    /// Replacement up set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<BTreeSet<PortId>>,
    /// Replacement down set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<BTreeSet<PortId>>,
    /// Replacement protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nos: Option<ProtocolKind>,
}

impl From<ServiceEntry> for EntryPatch {
    fn from(entry: ServiceEntry) -> Self {
        Self {
            name: entry.name,
            up: Some(entry.up),
            down: Some(entry.down),
            nos: Some(entry.nos),
        }
    }
}

/// A submitted document, possibly partial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePatch {
    /// Target document
    pub name: ServiceName,
    /// Replacement schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Entry patches in submission order
    #[serde(default)]
    pub entries: Vec<EntryPatch>,
}

impl ServicePatch {
    /// Merge onto `base` entry by entry
    ///
    /// Entries named in the patch have their present fields replaced; new
    /// entries are appended and must carry `nos`. With `base = None` the patch
    /// must describe the whole document.
    pub fn apply_to(&self, base: Option<&ServiceDocument>) -> Result<ServiceDocument, ValidationError> {
        let mut doc = base
            .cloned()
            .unwrap_or_else(|| ServiceDocument::new(self.name.clone()));
        if self.schema.is_some() {
            doc.schema.clone_from(&self.schema);
        }

        for patch in &self.entries {
            match doc.entries.iter_mut().find(|entry| entry.name == patch.name) {
                Some(entry) => {
                    if let Some(up) = &patch.up {
                        entry.up.clone_from(up);
                    }
                    if let Some(down) = &patch.down {
                        entry.down.clone_from(down);
                    }
                    if let Some(nos) = patch.nos {
                        entry.nos = nos;
                    }
                }
                None => {
                    let nos = patch.nos.ok_or_else(|| ValidationError::MissingProtocol {
                        service: self.name.clone(),
                        entry: patch.name.clone(),
                    })?;
                    doc.entries.push(ServiceEntry {
                        name: patch.name.clone(),
                        up: patch.up.clone().unwrap_or_default(),
                        down: patch.down.clone().unwrap_or_default(),
                        nos,
                    });
                }
            }
        }
        Ok(doc)
    }
}

impl From<ServiceDocument> for ServicePatch {
    fn from(doc: ServiceDocument) -> Self {
        Self {
            name: doc.name,
            schema: doc.schema,
            entries: doc.entries.into_iter().map(EntryPatch::from).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Document(ServicePatch),
    Keyed(BTreeMap<ServiceName, Vec<EntryPatch>>),
}

/// Parse a submission body
///
/// Accepts either a single `{name, schema?, entries}` document or the keyed
/// form `{"transceivers": [{name, up, down, nos}, ...]}`, which may carry
/// several services at once.
pub fn parse_patches(body: &str) -> Result<Vec<ServicePatch>, ValidationError> {
    let payload: Payload =
        serde_json::from_str(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    let patches = match payload {
        Payload::Document(patch) => vec![patch],
        Payload::Keyed(services) => services
            .into_iter()
            .map(|(name, entries)| ServicePatch {
                name,
                schema: None,
                entries,
            })
            .collect(),
    };
    if patches.is_empty() {
        return Err(ValidationError::Malformed("no service in payload".into()));
    }
    Ok(patches)
}
