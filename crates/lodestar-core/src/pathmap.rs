//! Path operations and the per-device PathMap
//!
//! A `PathOp` is the unit every layer speaks: the builder emits them, the
//! engine diffs them, the translation shim renders them into native payloads.
//! Two ops are the same op when path, operation and value all match; values
//! compare by their canonical JSON text so the identity is hashable.

use crate::errors::ValidationError;
use crate::identifiers::DeviceId;
use crate::path::YangPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

/// What a `PathOp` does at its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Write a value, creating intermediate nodes
    Set,
    /// Remove the subtree rooted at the path
    Delete,
}

/// One configuration operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathOp {
    /// Absolute target path
    pub target_path: YangPath,
    /// Set or delete
    pub operation: Operation,
    /// Value for `set`; always `null` for `delete`
    #[serde(default)]
    pub value: Value,
}

impl PathOp {
    /// Set `path` to `value`
    pub fn set(target_path: YangPath, value: Value) -> Self {
        Self {
            target_path,
            operation: Operation::Set,
            value,
        }
    }

    /// Delete the subtree at `path`
    pub fn delete(target_path: YangPath) -> Self {
        Self {
            target_path,
            operation: Operation::Delete,
            value: Value::Null,
        }
    }

    /// True for `set` ops
    pub fn is_set(&self) -> bool {
        self.operation == Operation::Set
    }

    /// True for `delete` ops
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }

    /// Canonical JSON text of the value
    ///
    /// `serde_json` keeps object keys sorted unless `preserve_order` is
    /// enabled, so equal values always render to equal text.
    pub fn canonical_value(&self) -> String {
        self.value.to_string()
    }
}

impl PartialEq for PathOp {
    fn eq(&self, other: &Self) -> bool {
        self.operation == other.operation
            && self.target_path == other.target_path
            && self.value == other.value
    }
}

impl Eq for PathOp {}

impl Hash for PathOp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target_path.hash(state);
        self.operation.hash(state);
        self.canonical_value().hash(state);
    }
}

impl std::fmt::Display for PathOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operation {
            Operation::Set => write!(f, "set {} = {}", self.target_path, self.value),
            Operation::Delete => write!(f, "delete {}", self.target_path),
        }
    }
}

/// Per-device ordered configuration operations
///
/// Devices iterate in `DeviceId` order, so serializing a PathMap is
/// byte-identical for identical content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathMap {
    devices: BTreeMap<DeviceId, Vec<PathOp>>,
}

impl PathMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Ops for `device`, empty when the device has none
    pub fn ops(&self, device: &DeviceId) -> &[PathOp] {
        self.devices.get(device).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append one op to a device's sequence
    pub fn push(&mut self, device: DeviceId, op: PathOp) {
        self.devices.entry(device).or_default().push(op);
    }

    /// Replace a device's sequence wholesale
    pub fn insert(&mut self, device: DeviceId, ops: Vec<PathOp>) {
        self.devices.insert(device, ops);
    }

    /// Devices present in the map
    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.keys()
    }

    /// Iterate devices with their ops
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &Vec<PathOp>)> {
        self.devices.iter()
    }

    /// True when no device has an op
    pub fn is_empty(&self) -> bool {
        self.devices.values().all(Vec::is_empty)
    }

    /// Total op count across devices
    pub fn op_count(&self) -> usize {
        self.devices.values().map(Vec::len).sum()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> BTreeMap<DeviceId, Vec<PathOp>> {
        self.devices
    }

    /// Check the prerequisite ordering of every device sequence
    pub fn check_ordering(&self) -> Result<(), ValidationError> {
        for ops in self.devices.values() {
            check_ordering(ops)?;
        }
        Ok(())
    }
}

impl FromIterator<(DeviceId, Vec<PathOp>)> for PathMap {
    fn from_iter<I: IntoIterator<Item = (DeviceId, Vec<PathOp>)>>(iter: I) -> Self {
        Self {
            devices: iter.into_iter().collect(),
        }
    }
}

/// Anchor path of a list entry: `…/list[key=v]/config/key`
pub fn anchor_path(entry: &YangPath) -> Option<YangPath> {
    let segment = entry.last()?;
    let (key, _) = segment.keys.first()?;
    Some(entry.child("config").child(key.clone()))
}

/// Verify that every `set` below a list entry follows the entry's anchor
///
/// Deletes carry no prerequisite. A `set` of the anchor itself is always
/// allowed and makes the entry available to later ops.
pub fn check_ordering(ops: &[PathOp]) -> Result<(), ValidationError> {
    let mut anchored: HashSet<YangPath> = HashSet::new();
    for op in ops.iter().filter(|op| op.is_set()) {
        let Some(entry) = op.target_path.entry_prefix() else {
            continue;
        };
        let Some(anchor) = anchor_path(&entry) else {
            continue;
        };
        if op.target_path == anchor {
            anchored.insert(entry);
        } else if !anchored.contains(&entry) {
            return Err(ValidationError::InvalidPath {
                path: op.target_path.to_string(),
                reason: format!("set precedes its anchor {anchor}"),
            });
        }
    }
    Ok(())
}

/// Leaf state implied by applying `ops` in order to an empty tree
///
/// `set` writes a leaf; `delete` removes the path and everything below it.
pub fn effective_state<'a>(ops: impl IntoIterator<Item = &'a PathOp>) -> BTreeMap<YangPath, Value> {
    let mut state = BTreeMap::new();
    for op in ops {
        match op.operation {
            Operation::Set => {
                state.insert(op.target_path.clone(), op.value.clone());
            }
            Operation::Delete => {
                state.retain(|path: &YangPath, _| !path.starts_with(&op.target_path));
            }
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> YangPath {
        YangPath::parse(raw).unwrap()
    }

    #[test]
    fn test_identity_covers_path_operation_and_value() {
        let a = PathOp::set(path("/i[name=oe1]/config/enabled"), json!(true));
        let b = PathOp::set(path("/i[name=oe1]/config/enabled"), json!(true));
        let c = PathOp::set(path("/i[name=oe1]/config/enabled"), json!(false));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<PathOp> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_object_values_compare_canonically() {
        let a = PathOp::set(path("/x"), json!({"b": 1, "a": 2}));
        let b = PathOp::set(path("/x"), json!({"a": 2, "b": 1}));
        assert_eq!(a.canonical_value(), b.canonical_value());
        assert_eq!(a, b);
    }

    #[test]
    fn test_ordering_requires_anchor_first() {
        let anchor = PathOp::set(path("/i[name=oe1]/config/name"), json!("oe1"));
        let leaf = PathOp::set(path("/i[name=oe1]/config/enabled"), json!(true));
        let delete = PathOp::delete(path("/i[name=oe2]"));

        assert!(check_ordering(&[anchor.clone(), leaf.clone(), delete.clone()]).is_ok());
        assert!(check_ordering(&[delete, leaf.clone(), anchor]).is_err());
        assert!(check_ordering(&[PathOp::set(path("/system/config/hostname"), json!("x"))]).is_ok());
    }

    #[test]
    fn test_effective_state_applies_deletes_to_subtrees() {
        let ops = vec![
            PathOp::set(path("/i[name=oe1]/config/name"), json!("oe1")),
            PathOp::set(path("/i[name=oe1]/config/enabled"), json!(true)),
            PathOp::set(path("/i[name=oe2]/config/name"), json!("oe2")),
            PathOp::delete(path("/i[name=oe1]")),
        ];
        let state = effective_state(&ops);
        assert_eq!(state.len(), 1);
        assert_eq!(state.get(&path("/i[name=oe2]/config/name")), Some(&json!("oe2")));
    }

    #[test]
    fn test_pathmap_serializes_in_device_order() {
        let mut map = PathMap::new();
        map.push(DeviceId::new("zeta"), PathOp::delete(path("/a")));
        map.push(DeviceId::new("alpha"), PathOp::delete(path("/b")));
        let text = serde_json::to_string(&map).unwrap();
        assert!(text.find("alpha").unwrap() < text.find("zeta").unwrap());
        assert_eq!(map.op_count(), 2);
        assert!(map.ops(&DeviceId::new("missing")).is_empty());
    }
}
