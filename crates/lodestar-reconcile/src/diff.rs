//! Desired-vs-applied diff
//!
//! `toPush = retractions ++ (desired \ applied)`. The set difference uses
//! full op identity and keeps builder order. Retractions undo applied `set`
//! ops whose path the new PathMap no longer addresses; they run in reverse
//! applied order so leaves go before their anchors.

use lodestar_core::{PathOp, YangPath};
use std::collections::HashSet;

/// Ops that move a device from `applied` to `desired`
pub fn diff_device(desired: &[PathOp], applied: &[PathOp]) -> Vec<PathOp> {
    let mut to_push = retractions(desired, applied);
    let already: HashSet<&PathOp> = applied.iter().collect();
    to_push.extend(
        desired
            .iter()
            .filter(|op| !already.contains(op))
            .cloned(),
    );
    to_push
}

/// Deletes for applied `set` paths that `desired` abandons
///
/// A path is abandoned when no desired op targets it and no desired delete
/// already covers it (targets it or one of its ancestors). Applied deletes
/// are never retracted.
pub fn retractions(desired: &[PathOp], applied: &[PathOp]) -> Vec<PathOp> {
    let addressed: HashSet<&YangPath> = desired.iter().map(|op| &op.target_path).collect();
    let deleted: Vec<&YangPath> = desired
        .iter()
        .filter(|op| op.is_delete())
        .map(|op| &op.target_path)
        .collect();

    let mut seen: HashSet<&YangPath> = HashSet::new();
    applied
        .iter()
        .rev()
        .filter(|op| op.is_set())
        .map(|op| &op.target_path)
        .filter(|path| !addressed.contains(path))
        .filter(|path| !deleted.iter().any(|prefix| path.starts_with(prefix)))
        .filter(|path| seen.insert(*path))
        .map(|path| PathOp::delete(path.clone()))
        .collect()
}
