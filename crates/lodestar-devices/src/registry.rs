//! Protocol drivers and their registry

use async_trait::async_trait;
use lodestar_core::{DeviceError, DeviceId, ProtocolKind};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Moves native YANG-JSON payloads to and from devices over one protocol
#[async_trait]
pub trait ProtocolDriver: Send + Sync {
    /// Protocol this driver speaks
    fn protocol(&self) -> ProtocolKind;

    /// Full running configuration of a device
    async fn fetch(&self, device: &DeviceId) -> Result<Value, DeviceError>;

    /// Replace a device's running configuration
    async fn push(&self, device: &DeviceId, payload: &Value) -> Result<(), DeviceError>;
}

/// Drivers keyed by protocol
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<ProtocolKind, Arc<dyn ProtocolDriver>>,
}

impl DriverRegistry {
    /// Registry without drivers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its own protocol, replacing any previous one
    pub fn register(&mut self, driver: Arc<dyn ProtocolDriver>) {
        self.drivers.insert(driver.protocol(), driver);
    }

    /// Builder-style `register`
    pub fn with_driver(mut self, driver: Arc<dyn ProtocolDriver>) -> Self {
        self.register(driver);
        self
    }

    /// Driver for `protocol`
    pub fn get(&self, protocol: ProtocolKind) -> Option<&Arc<dyn ProtocolDriver>> {
        self.drivers.get(&protocol)
    }

    /// Protocols with a registered driver
    pub fn protocols(&self) -> Vec<ProtocolKind> {
        let mut protocols: Vec<_> = self.drivers.keys().copied().collect();
        protocols.sort();
        protocols
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}
