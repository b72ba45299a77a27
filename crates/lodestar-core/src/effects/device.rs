//! Device adapter effect
//!
//! The core hands over normalized PathOps and gets normalized PathOps back.
//! Native payloads and protocol transports live behind this trait in
//! `lodestar-devices`. Implementations are stateless per call.

use crate::errors::DeviceError;
use crate::identifiers::{DeviceId, ProtocolKind};
use crate::pathmap::PathOp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A device plus the protocol used to reach it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceTarget {
    /// Device identifier
    pub id: DeviceId,
    /// Management protocol
    pub protocol: ProtocolKind,
}

impl DeviceTarget {
    /// Create a new target
    pub fn new(id: impl Into<DeviceId>, protocol: ProtocolKind) -> Self {
        Self {
            id: id.into(),
            protocol,
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.protocol)
    }
}

/// Read and write device configuration as PathOps
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Current device state as sorted `set` ops, one per leaf
    async fn read(&self, target: &DeviceTarget) -> Result<Vec<PathOp>, DeviceError>;

    /// Apply `ops` in order
    async fn write(&self, target: &DeviceTarget, ops: &[PathOp]) -> Result<(), DeviceError>;
}
