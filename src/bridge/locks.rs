//! Per-device serialisation of bridge runs
//!
//! A device has one bridge service and one wrapper path, so only one bridge
//! job may be in flight per device. Different devices never contend.

use rootlink_shared::DeviceRef;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async lock per device
#[derive(Debug, Clone, Default)]
pub struct DeviceLocks {
    locks: Arc<Mutex<HashMap<DeviceRef, Arc<Mutex<()>>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other job holds this device
    pub async fn acquire(&self, device: &DeviceRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(device.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
