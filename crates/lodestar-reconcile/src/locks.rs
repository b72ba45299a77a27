//! Per-device mutual exclusion
//!
//! Reconciliation passes and drift syncs both take the locks of every device
//! they touch. Locks are always acquired in sorted `DeviceId` order, so two
//! passes with overlapping device sets cannot deadlock; disjoint sets run in
//! parallel.

use lodestar_core::DeviceId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Shared table of per-device locks
#[derive(Clone, Default)]
pub struct DeviceLocks {
    table: Arc<Mutex<HashMap<DeviceId, Arc<AsyncMutex<()>>>>>,
}

/// Held locks; released on drop
pub struct DeviceGuards {
    devices: Vec<DeviceId>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl DeviceGuards {
    /// Devices held, sorted
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }
}

impl std::fmt::Debug for DeviceGuards {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGuards")
            .field("devices", &self.devices)
            .finish()
    }
}

impl DeviceLocks {
    /// Empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, device: &DeviceId) -> Arc<AsyncMutex<()>> {
        self.table
            .lock()
            .entry(device.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock every device in `devices`, in sorted order
    pub async fn acquire<'a>(&self, devices: impl IntoIterator<Item = &'a DeviceId>) -> DeviceGuards {
        let sorted: BTreeSet<&DeviceId> = devices.into_iter().collect();
        let mut guards = Vec::with_capacity(sorted.len());
        for device in &sorted {
            guards.push(self.handle(device).lock_owned().await);
        }
        DeviceGuards {
            devices: sorted.into_iter().cloned().collect(),
            _guards: guards,
        }
    }

    /// Whether some holder currently has `device` locked
    pub fn is_locked(&self, device: &DeviceId) -> bool {
        self.handle(device).try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guards_release_on_drop() {
        let locks = DeviceLocks::new();
        let a = DeviceId::new("a");
        let guards = locks.acquire([&a]).await;
        assert!(locks.is_locked(&a));
        drop(guards);
        assert!(!locks.is_locked(&a));
    }

    #[tokio::test]
    async fn test_overlapping_acquisitions_do_not_deadlock() {
        let locks = DeviceLocks::new();
        let (a, b) = (DeviceId::new("a"), DeviceId::new("b"));

        let first = {
            let locks = locks.clone();
            let (a, b) = (a.clone(), b.clone());
            async move {
                for _ in 0..20 {
                    let _g = locks.acquire([&a, &b]).await;
                    tokio::task::yield_now().await;
                }
            }
        };
        let second = {
            let locks = locks.clone();
            async move {
                for _ in 0..20 {
                    let _g = locks.acquire([&b, &a]).await;
                    tokio::task::yield_now().await;
                }
            }
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(first, second);
        })
        .await
        .unwrap();
    }
}
