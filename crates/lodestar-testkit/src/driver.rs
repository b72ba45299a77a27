//! In-memory protocol driver with fault injection

use async_trait::async_trait;
use lodestar_core::{DeviceError, DeviceId, PathOp, ProtocolKind};
use lodestar_devices::{normalize, ProtocolDriver};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct DriverState {
    native: HashMap<DeviceId, Value>,
    unreachable: HashSet<DeviceId>,
    rejecting: HashSet<DeviceId>,
    hanging: HashSet<DeviceId>,
    hanging_reads: HashSet<DeviceId>,
    reads_hang_after_push: HashSet<DeviceId>,
    writes: HashMap<DeviceId, usize>,
    write_delay: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Devices held as native JSON in memory
///
/// Clones share state, and [`MemoryDriver::for_protocol`] gives a view of
/// the same devices under another protocol, so one driver can back both
/// NETCONF and gNMI devices in a test.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    protocol: ProtocolKind,
    state: Arc<Mutex<DriverState>>,
}

impl MemoryDriver {
    /// Empty driver for `protocol`
    pub fn new(protocol: ProtocolKind) -> Self {
        Self {
            protocol,
            state: Arc::new(Mutex::new(DriverState::default())),
        }
    }

    /// Same devices, another protocol
    pub fn for_protocol(&self, protocol: ProtocolKind) -> Self {
        Self {
            protocol,
            state: Arc::clone(&self.state),
        }
    }

    /// Overwrite a device's running configuration
    pub fn set_native(&self, device: &DeviceId, config: Value) {
        self.state.lock().native.insert(device.clone(), config);
    }

    /// A device's running configuration, `{}` if never written
    pub fn native(&self, device: &DeviceId) -> Value {
        self.state
            .lock()
            .native
            .get(device)
            .cloned()
            .unwrap_or_else(|| json!({}))
    }

    /// A device's running configuration as normalized leaves
    pub fn state_ops(&self, device: &DeviceId) -> Vec<PathOp> {
        normalize(&self.native(device))
    }

    /// Make every call for `device` fail as unreachable
    pub fn fail_device(&self, device: &DeviceId) {
        self.state.lock().unreachable.insert(device.clone());
    }

    /// Make pushes to `device` fail as rejected
    pub fn reject_writes(&self, device: &DeviceId) {
        self.state.lock().rejecting.insert(device.clone());
    }

    /// Make pushes to `device` never complete
    pub fn hang_device(&self, device: &DeviceId) {
        self.state.lock().hanging.insert(device.clone());
    }

    /// Make reads of `device` never complete
    pub fn hang_reads(&self, device: &DeviceId) {
        self.state.lock().hanging_reads.insert(device.clone());
    }

    /// Make reads of `device` never complete once it has accepted a push
    pub fn hang_reads_after_push(&self, device: &DeviceId) {
        self.state.lock().reads_hang_after_push.insert(device.clone());
    }

    /// Delay every push by `delay`
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().write_delay = Some(delay);
    }

    /// Remove every injected fault and delay
    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.unreachable.clear();
        state.rejecting.clear();
        state.hanging.clear();
        state.hanging_reads.clear();
        state.reads_hang_after_push.clear();
        state.write_delay = None;
    }

    /// Completed pushes to `device`
    pub fn write_count(&self, device: &DeviceId) -> usize {
        self.state.lock().writes.get(device).copied().unwrap_or(0)
    }

    /// Completed pushes across all devices
    pub fn total_writes(&self) -> usize {
        self.state.lock().writes.values().sum()
    }

    /// Highest number of pushes ever in progress at once
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }
}

#[async_trait]
impl ProtocolDriver for MemoryDriver {
    fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    async fn fetch(&self, device: &DeviceId) -> Result<Value, DeviceError> {
        let hang = {
            let state = self.state.lock();
            if state.unreachable.contains(device) {
                return Err(DeviceError::Unreachable {
                    device: device.clone(),
                    reason: "injected fault".into(),
                });
            }
            state.hanging_reads.contains(device)
                || (state.reads_hang_after_push.contains(device)
                    && state.writes.get(device).copied().unwrap_or(0) > 0)
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        Ok(self.native(device))
    }

    async fn push(&self, device: &DeviceId, payload: &Value) -> Result<(), DeviceError> {
        let (hang, delay) = {
            let mut state = self.state.lock();
            if state.unreachable.contains(device) {
                return Err(DeviceError::Unreachable {
                    device: device.clone(),
                    reason: "injected fault".into(),
                });
            }
            if state.rejecting.contains(device) {
                return Err(DeviceError::Rejected {
                    device: device.clone(),
                    reason: "injected rejection".into(),
                });
            }
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            (state.hanging.contains(device), state.write_delay)
        };

        if hang {
            futures::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.in_flight -= 1;
        state.native.insert(device.clone(), payload.clone());
        *state.writes.entry(device.clone()).or_default() += 1;
        Ok(())
    }
}
