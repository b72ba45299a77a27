//! Lodestar Intent - the desired generation
//!
//! `IntentStore` accepts service documents (merge, replace, delete), keeps
//! them in the versioned store and reports each mutation as a `Changeset`
//! for the reconciliation engine.

#![forbid(unsafe_code)]

pub mod changeset;
pub mod store;

pub use changeset::Changeset;
pub use store::IntentStore;
