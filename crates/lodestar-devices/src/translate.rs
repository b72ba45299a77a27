//! Translation between native YANG-JSON and PathOps
//!
//! Native payloads follow the YANG-JSON shape: containers are objects, keyed
//! lists are arrays of objects that carry their key leaves inline.
//!
//! ```json
//! {"openconfig-interfaces:interfaces": {"interface": [
//!     {"name": "oe1", "config": {"name": "oe1", "enabled": true}}
//! ]}}
//! ```
//!
//! `apply_ops` edits such a tree in place; `normalize` flattens one into
//! sorted leaf `set` ops.

use lodestar_core::{Operation, PathOp, PathSegment, YangPath};
use serde_json::{Map, Value};

/// Why an op could not be applied to a native tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {op}: {reason}")]
pub struct EditError {
    /// Rendered op
    pub op: String,
    /// Editor complaint
    pub reason: String,
}

/// Apply ops in order to a native tree
pub fn apply_ops(root: &mut Value, ops: &[PathOp]) -> Result<(), EditError> {
    for op in ops {
        apply_op(root, op)?;
    }
    Ok(())
}

/// Apply a single op
///
/// `set` creates missing containers and list entries. `delete` removes the
/// subtree and prunes ancestors it leaves empty; deleting an absent path is
/// a no-op.
pub fn apply_op(root: &mut Value, op: &PathOp) -> Result<(), EditError> {
    let segments = op.target_path.segments();
    match op.operation {
        Operation::Set => {
            if segments.is_empty() {
                *root = op.value.clone();
                return Ok(());
            }
            set_path(root, segments, &op.value).map_err(|reason| EditError {
                op: op.to_string(),
                reason,
            })
        }
        Operation::Delete => {
            if segments.is_empty() {
                *root = Value::Object(Map::new());
            } else {
                remove_path(root, segments);
            }
            Ok(())
        }
    }
}

fn key_matches(value: Option<&Value>, expected: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == expected,
        Some(other) => other.to_string() == expected,
        None => false,
    }
}

fn entry_matches(item: &Value, segment: &PathSegment) -> bool {
    segment
        .keys
        .iter()
        .all(|(key, expected)| key_matches(item.get(key), expected))
}

fn as_object<'a>(node: &'a mut Value, at: &str) -> Result<&'a mut Map<String, Value>, String> {
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
        .ok_or_else(|| format!("{at} is not a container"))
}

fn set_path(node: &mut Value, segments: &[PathSegment], value: &Value) -> Result<(), String> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value.clone();
        return Ok(());
    };
    let obj = as_object(node, &head.name)?;

    if !head.is_keyed() {
        let child = obj.entry(head.name.clone()).or_insert(Value::Null);
        return set_path(child, rest, value);
    }

    let list = obj
        .entry(head.name.clone())
        .or_insert_with(|| Value::Array(Vec::new()));
    let items = list
        .as_array_mut()
        .ok_or_else(|| format!("{} is not a list", head.name))?;
    let idx = match items.iter().position(|item| entry_matches(item, head)) {
        Some(idx) => idx,
        None => {
            let entry: Map<String, Value> = head
                .keys
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            items.push(Value::Object(entry));
            items.len() - 1
        }
    };

    if rest.is_empty() {
        let mut replacement = match value {
            Value::Object(map) => map.clone(),
            _ => return Err(format!("list entry {head} needs an object value")),
        };
        for (k, v) in &head.keys {
            replacement.insert(k.clone(), Value::String(v.clone()));
        }
        items[idx] = Value::Object(replacement);
        return Ok(());
    }
    set_path(&mut items[idx], rest, value)
}

fn is_empty_node(node: &Value) -> bool {
    match node {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

/// An entry that holds nothing but its key leaves
fn is_bare_entry(item: &Value, segment: &PathSegment) -> bool {
    item.as_object().is_some_and(|map| {
        map.keys()
            .all(|member| segment.keys.iter().any(|(key, _)| key == member))
    })
}

fn remove_path(node: &mut Value, segments: &[PathSegment]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(obj) = node.as_object_mut() else {
        return;
    };

    if head.is_keyed() {
        let Some(Value::Array(items)) = obj.get_mut(&head.name) else {
            return;
        };
        let Some(idx) = items.iter().position(|item| entry_matches(item, head)) else {
            return;
        };
        if rest.is_empty() {
            items.remove(idx);
        } else {
            remove_path(&mut items[idx], rest);
            if is_bare_entry(&items[idx], head) {
                items.remove(idx);
            }
        }
        if items.is_empty() {
            obj.remove(&head.name);
        }
        return;
    }

    if rest.is_empty() {
        obj.remove(&head.name);
    } else if let Some(child) = obj.get_mut(&head.name) {
        remove_path(child, rest);
        if is_empty_node(child) {
            obj.remove(&head.name);
        }
    }
}

/// Flatten a native tree into sorted leaf `set` ops
///
/// An array of objects is treated as a keyed list. Its key is the entry-level
/// scalar mirrored under `config` (the OpenConfig convention), preferring
/// `name`, falling back to an unmirrored `name`. Entry-level key leaves are folded into the path predicate rather
/// than emitted as leaves of their own. Arrays that cannot be keyed are
/// emitted as leaf values.
pub fn normalize(root: &Value) -> Vec<PathOp> {
    let mut ops = Vec::new();
    walk(&YangPath::root(), root, &[], &mut ops);
    ops.sort_by(|a, b| a.target_path.cmp(&b.target_path));
    ops
}

fn list_key(item: &Map<String, Value>) -> Option<String> {
    let config = item.get("config").and_then(Value::as_object);
    let is_mirrored = |member: &str, value: &Value| {
        is_scalar(value) && config.and_then(|c| c.get(member)) == Some(value)
    };
    if item.get("name").is_some_and(|v| is_mirrored("name", v)) {
        return Some("name".to_string());
    }
    let mirrored = item
        .iter()
        .find(|(member, value)| is_mirrored(member.as_str(), *value));
    if let Some((member, _)) = mirrored {
        return Some(member.clone());
    }
    item.get("name").filter(|v| is_scalar(v)).map(|_| "name".to_string())
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn walk(path: &YangPath, node: &Value, skip: &[String], ops: &mut Vec<PathOp>) {
    match node {
        Value::Object(map) => {
            for (member, child) in map {
                if skip.contains(member) {
                    continue;
                }
                walk_member(path, member, child, ops);
            }
        }
        Value::Null => {}
        leaf => ops.push(PathOp::set(path.clone(), leaf.clone())),
    }
}

fn walk_member(path: &YangPath, member: &str, child: &Value, ops: &mut Vec<PathOp>) {
    if let Value::Array(items) = child {
        let keyed: Option<Vec<(String, &Map<String, Value>)>> = items
            .iter()
            .map(|item| {
                let map = item.as_object()?;
                Some((list_key(map)?, map))
            })
            .collect();
        if let Some(entries) = keyed.filter(|entries| !entries.is_empty()) {
            for (key, map) in entries {
                let Some(value) = map.get(&key) else {
                    continue;
                };
                let entry_path = path.keyed_child(member, key.clone(), scalar_text(value));
                walk(&entry_path, &Value::Object(map.clone()), &[key], ops);
            }
            return;
        }
    }
    walk(&path.child(member), child, &[], ops);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> YangPath {
        YangPath::parse(raw).unwrap()
    }

    #[test]
    fn test_set_creates_containers_and_entries() {
        let mut root = json!({});
        apply_ops(
            &mut root,
            &[
                PathOp::set(path("/ifs/interface[name=oe1]/config/name"), json!("oe1")),
                PathOp::set(path("/ifs/interface[name=oe1]/config/enabled"), json!(true)),
            ],
        )
        .unwrap();
        assert_eq!(
            root,
            json!({"ifs": {"interface": [
                {"name": "oe1", "config": {"name": "oe1", "enabled": true}}
            ]}})
        );
    }

    #[test]
    fn test_delete_prunes_empty_ancestors() {
        let mut root = json!({"ifs": {"interface": [
            {"name": "oe1", "config": {"name": "oe1", "enabled": true}},
            {"name": "oe2", "config": {"name": "oe2"}}
        ]}, "system": {"hostname": "r1"}});

        apply_op(&mut root, &PathOp::delete(path("/ifs/interface[name=oe2]/config"))).unwrap();
        assert_eq!(root["ifs"]["interface"].as_array().unwrap().len(), 1);

        apply_op(&mut root, &PathOp::delete(path("/ifs/interface[name=oe1]"))).unwrap();
        assert_eq!(root, json!({"system": {"hostname": "r1"}}));

        // absent path
        apply_op(&mut root, &PathOp::delete(path("/ifs/interface[name=oe9]"))).unwrap();
        assert_eq!(root, json!({"system": {"hostname": "r1"}}));
    }

    #[test]
    fn test_set_through_a_leaf_fails() {
        let mut root = json!({"system": "flat"});
        let err = apply_op(&mut root, &PathOp::set(path("/system/config/hostname"), json!("r1")))
            .unwrap_err();
        assert!(err.reason.contains("not a container"));
    }

    #[test]
    fn test_normalize_folds_key_leaves() {
        let root = json!({"openconfig-platform:components": {"component": [
            {"name": "oe2", "config": {"name": "oe2"},
             "openconfig-platform-transceiver:transceiver": {"config": {"enabled": true}}},
            {"name": "oe1", "config": {"name": "oe1"}}
        ]}});

        let ops = normalize(&root);
        let paths: Vec<String> = ops.iter().map(|op| op.target_path.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/openconfig-platform:components/component[name=oe1]/config/name",
                "/openconfig-platform:components/component[name=oe2]/config/name",
                "/openconfig-platform:components/component[name=oe2]/openconfig-platform-transceiver:transceiver/config/enabled",
            ]
        );
        assert!(ops.iter().all(PathOp::is_set));
    }

    #[test]
    fn test_mirrored_name_is_preferred_key() {
        let root = json!({"ifs": {"interface": [
            {"description": "x", "config": {"description": "x", "name": "oe1"}, "name": "oe1"}
        ]}});

        let ops = normalize(&root);
        assert!(!ops.is_empty());
        assert!(ops
            .iter()
            .all(|op| op.target_path.to_string().starts_with("/ifs/interface[name=oe1]/")));
    }

    #[test]
    fn test_normalize_inverts_apply() {
        let ops = vec![
            PathOp::set(path("/ifs/interface[name=Ethernet1/1]/config/name"), json!("Ethernet1/1")),
            PathOp::set(path("/ifs/interface[name=Ethernet1/1]/config/enabled"), json!(false)),
            PathOp::set(path("/system/config/hostname"), json!("r1")),
        ];
        let mut root = json!({});
        apply_ops(&mut root, &ops).unwrap();

        let mut expected = ops.clone();
        expected.sort_by(|a, b| a.target_path.cmp(&b.target_path));
        assert_eq!(normalize(&root), expected);
    }

    #[test]
    fn test_unkeyed_arrays_are_leaves() {
        let root = json!({"ntp": {"servers": ["10.0.0.1", "10.0.0.2"]}});
        assert_eq!(
            normalize(&root),
            vec![PathOp::set(path("/ntp/servers"), json!(["10.0.0.1", "10.0.0.2"]))]
        );
    }
}
