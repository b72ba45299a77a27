//! Lodestar Devices - device protocol adapter layer
//!
//! The reconciliation core speaks PathOps. Devices speak native YANG-JSON
//! over a management protocol. This crate sits in between:
//!
//! - `translate`: path editor and state normalizer
//! - `registry`: `ProtocolDriver` trait and per-protocol registry
//! - `adapter`: `TranslatingAdapter`, the `DeviceAdapter` the engine uses
//! - `file_driver`: devices simulated as JSON files

#![forbid(unsafe_code)]

pub mod adapter;
pub mod file_driver;
pub mod registry;
pub mod translate;

pub use adapter::TranslatingAdapter;
pub use file_driver::FileDriver;
pub use registry::{DriverRegistry, ProtocolDriver};
pub use translate::{apply_op, apply_ops, normalize, EditError};
