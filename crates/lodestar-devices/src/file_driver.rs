//! File-backed simulated devices
//!
//! Each device is `<root>/<device>.json`. A missing file is a device with an
//! empty running configuration; a missing root directory is an unreachable
//! device.

use crate::registry::ProtocolDriver;
use async_trait::async_trait;
use lodestar_core::{DeviceError, DeviceId, ProtocolKind};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Simulated devices stored as JSON files
#[derive(Debug, Clone)]
pub struct FileDriver {
    root: PathBuf,
    protocol: ProtocolKind,
}

impl FileDriver {
    /// Driver for `protocol` reading and writing under `root`
    pub fn new(root: impl Into<PathBuf>, protocol: ProtocolKind) -> Self {
        Self {
            root: root.into(),
            protocol,
        }
    }

    /// Directory holding the device files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn device_path(&self, device: &DeviceId) -> Result<PathBuf, DeviceError> {
        let name = device.as_str();
        if name.is_empty() || name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
            return Err(DeviceError::UnknownDevice(device.clone()));
        }
        Ok(self.root.join(format!("{name}.json")))
    }

    fn unreachable(device: &DeviceId, err: impl std::fmt::Display) -> DeviceError {
        DeviceError::Unreachable {
            device: device.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ProtocolDriver for FileDriver {
    fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    async fn fetch(&self, device: &DeviceId) -> Result<Value, DeviceError> {
        if fs::metadata(&self.root).await.is_err() {
            return Err(Self::unreachable(device, "device directory is missing"));
        }
        let path = self.device_path(device)?;
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| DeviceError::Translation {
                device: device.clone(),
                reason: e.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Value::Object(serde_json::Map::new()))
            }
            Err(err) => Err(Self::unreachable(device, err)),
        }
    }

    async fn push(&self, device: &DeviceId, payload: &Value) -> Result<(), DeviceError> {
        if fs::metadata(&self.root).await.is_err() {
            return Err(Self::unreachable(device, "device directory is missing"));
        }
        let path = self.device_path(device)?;
        let bytes = serde_json::to_vec_pretty(payload).map_err(|e| DeviceError::Translation {
            device: device.clone(),
            reason: e.to_string(),
        })?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)
            .await
            .map_err(|e| Self::unreachable(device, e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Self::unreachable(device, e))
    }
}
