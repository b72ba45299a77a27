//! Changesets: what an intent mutation touched

use lodestar_core::{DeviceId, DeviceTarget, ProtocolKind, ServiceDocument, ServiceName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Services and devices affected by one or more intent mutations
///
/// Devices carry the protocol to reach them so a reconciliation pass can
/// address devices that no longer appear in any document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    /// Services that changed
    pub services: BTreeSet<ServiceName>,
    /// Devices whose desired configuration may have changed
    pub devices: BTreeMap<DeviceId, ProtocolKind>,
}

impl Changeset {
    /// Nothing affected
    pub fn empty() -> Self {
        Self::default()
    }

    /// A change to `name`, covering the devices of its old and new versions
    ///
    /// When both versions name a device, the new protocol wins.
    pub fn for_service(
        name: ServiceName,
        before: Option<&ServiceDocument>,
        after: Option<&ServiceDocument>,
    ) -> Self {
        let mut devices = BTreeMap::new();
        for doc in [before, after].into_iter().flatten() {
            devices.extend(doc.devices());
        }
        Self {
            services: BTreeSet::from([name]),
            devices,
        }
    }

    /// Changeset naming devices directly
    pub fn for_devices(devices: impl IntoIterator<Item = (DeviceId, ProtocolKind)>) -> Self {
        Self {
            services: BTreeSet::new(),
            devices: devices.into_iter().collect(),
        }
    }

    /// Fold another changeset into this one; later protocols win
    pub fn merge(&mut self, other: Changeset) {
        self.services.extend(other.services);
        self.devices.extend(other.devices);
    }

    /// True when no device is affected
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Affected devices in sorted order
    pub fn targets(&self) -> Vec<DeviceTarget> {
        self.devices
            .iter()
            .map(|(id, protocol)| DeviceTarget::new(id.clone(), *protocol))
            .collect()
    }
}
