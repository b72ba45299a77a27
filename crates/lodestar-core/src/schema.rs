//! Intent schemas
//!
//! A schema tells the builder where a service's ports live in the device
//! tree: which module namespace, which keyed list, which key leaf and which
//! leaf toggles the port on.

use crate::errors::ValidationError;
use crate::identifiers::PortId;
use crate::path::YangPath;
use crate::pathmap::PathOp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Placement of one service's ports in the device tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSchema {
    /// Schema name referenced by service documents
    pub name: String,
    /// Top-level container, module-qualified
    pub namespace: String,
    /// Keyed list under the namespace
    pub list: String,
    /// Key leaf of the list
    pub key: String,
    /// Enable leaf, relative to the list entry
    pub enable_leaf: String,
}

impl ServiceSchema {
    /// OpenConfig platform transceivers
    pub fn transceivers() -> Self {
        Self {
            name: "transceivers".to_string(),
            namespace: "openconfig-platform:components".to_string(),
            list: "component".to_string(),
            key: "name".to_string(),
            enable_leaf: "openconfig-platform-transceiver:transceiver/config/enabled".to_string(),
        }
    }

    /// OpenConfig interfaces
    pub fn interfaces() -> Self {
        Self {
            name: "interfaces".to_string(),
            namespace: "openconfig-interfaces:interfaces".to_string(),
            list: "interface".to_string(),
            key: "name".to_string(),
            enable_leaf: "config/enabled".to_string(),
        }
    }

    /// Reject schemas whose pieces cannot form a path
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::Malformed(format!("schema {}: {reason}", self.name));
        if self.name.trim().is_empty() {
            return Err(ValidationError::Malformed("schema name must not be empty".into()));
        }
        for (field, value) in [
            ("namespace", &self.namespace),
            ("list", &self.list),
            ("key", &self.key),
        ] {
            if value.is_empty() || value.contains(['/', '[', ']']) {
                return Err(invalid(&format!("{field} must be a single segment")));
            }
        }
        if self.enable_leaf.is_empty() {
            return Err(invalid("enable_leaf must not be empty"));
        }
        YangPath::root().join(&self.enable_leaf)?;
        Ok(())
    }

    /// `/{namespace}/{list}[{key}={port}]`
    pub fn entry_path(&self, port: &PortId) -> YangPath {
        YangPath::root()
            .child(self.namespace.clone())
            .keyed_child(self.list.clone(), self.key.clone(), port.as_str())
    }

    /// `…/{list}[{key}={port}]/config/{key}`
    pub fn anchor_path(&self, port: &PortId) -> YangPath {
        self.entry_path(port).child("config").child(self.key.clone())
    }

    /// Enable leaf of a port's entry
    pub fn enable_path(&self, port: &PortId) -> Result<YangPath, ValidationError> {
        self.entry_path(port).join(&self.enable_leaf)
    }

    /// Ops bringing a port up: anchor first, then the enable leaf
    pub fn up_ops(&self, port: &PortId) -> Result<Vec<PathOp>, ValidationError> {
        Ok(vec![
            PathOp::set(self.anchor_path(port), Value::String(port.to_string())),
            PathOp::set(self.enable_path(port)?, Value::Bool(true)),
        ])
    }

    /// Op taking a port down: remove its whole entry
    pub fn down_op(&self, port: &PortId) -> PathOp {
        PathOp::delete(self.entry_path(port))
    }
}

/// Known schemas by name
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, ServiceSchema>,
}

impl SchemaRegistry {
    /// Registry with no schemas
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding `transceivers` and `interfaces`
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.insert(ServiceSchema::transceivers());
        registry.insert(ServiceSchema::interfaces());
        registry
    }

    /// Add or replace a schema after validating it
    pub fn register(&mut self, schema: ServiceSchema) -> Result<(), ValidationError> {
        schema.validate()?;
        self.insert(schema);
        Ok(())
    }

    fn insert(&mut self, schema: ServiceSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    /// Look up by name
    pub fn get(&self, name: &str) -> Option<&ServiceSchema> {
        self.schemas.get(name)
    }

    /// True when `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Registered names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
