//! PathOp-level device adapter over native protocol drivers

use crate::registry::{DriverRegistry, ProtocolDriver};
use crate::translate::{apply_ops, normalize};
use async_trait::async_trait;
use lodestar_core::{DeviceAdapter, DeviceError, DeviceTarget, PathOp};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Routes each call to the target protocol's driver and translates payloads
#[derive(Debug, Clone)]
pub struct TranslatingAdapter {
    drivers: DriverRegistry,
}

impl TranslatingAdapter {
    /// Adapter over a set of drivers
    pub fn new(drivers: DriverRegistry) -> Self {
        Self { drivers }
    }

    fn driver(&self, target: &DeviceTarget) -> Result<&Arc<dyn ProtocolDriver>, DeviceError> {
        self.drivers
            .get(target.protocol)
            .ok_or_else(|| DeviceError::UnsupportedProtocol {
                device: target.id.clone(),
                protocol: target.protocol,
            })
    }
}

#[async_trait]
impl DeviceAdapter for TranslatingAdapter {
    #[instrument(skip(self), fields(device = %target.id))]
    async fn read(&self, target: &DeviceTarget) -> Result<Vec<PathOp>, DeviceError> {
        let native = self.driver(target)?.fetch(&target.id).await?;
        let ops = normalize(&native);
        debug!(leaves = ops.len(), "normalized device state");
        Ok(ops)
    }

    #[instrument(skip(self, ops), fields(device = %target.id, ops = ops.len()))]
    async fn write(&self, target: &DeviceTarget, ops: &[PathOp]) -> Result<(), DeviceError> {
        let driver = self.driver(target)?;
        let mut native = driver.fetch(&target.id).await?;
        apply_ops(&mut native, ops).map_err(|e| DeviceError::Translation {
            device: target.id.clone(),
            reason: e.to_string(),
        })?;
        driver.push(&target.id, &native).await?;
        debug!("pushed native configuration");
        Ok(())
    }
}
