//! Device registry interface
//!
//! The registry owns device records and their persistence; the engine
//! only reads snapshots and hands back check results. This keeps the
//! engine free of storage concerns and independently testable.
//!
//! [`MemoryRegistry`] is the bundled implementation used by the daemon
//! (devices seeded from the config file) and by tests. Deployments with a
//! real inventory backend implement [`DeviceRegistry`] themselves.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::{CheckResult, Device};

/// Which probe flag makes a device eligible for a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFilter {
    /// Reachability probing enabled
    Ping,

    /// Metric collection enabled
    Collection,

    /// Either flag enabled
    Any,
}

impl ProbeFilter {
    fn matches(&self, device: &Device) -> bool {
        match self {
            ProbeFilter::Ping => device.ping_enabled,
            ProbeFilter::Collection => device.snmp_enabled,
            ProbeFilter::Any => device.ping_enabled || device.snmp_enabled,
        }
    }
}

/// Registry collaborator consumed by the scan engine.
///
/// `apply_check_result` is invoked once per device per completed check
/// and must tolerate concurrent, out-of-order calls for different
/// devices; any per-device ordering requirement lives behind this trait,
/// not in the engine.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Snapshot all devices matching the probe filter
    async fn list_eligible(&self, filter: ProbeFilter) -> RegistryResult<Vec<Device>>;

    /// Persist the outcome of one completed check
    async fn apply_check_result(
        &self,
        device_id: &str,
        result: &CheckResult,
    ) -> RegistryResult<()>;
}

/// In-memory registry (no persistence)
pub struct MemoryRegistry {
    devices: RwLock<HashMap<String, Device>>,
}

impl MemoryRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        let devices = devices
            .into_iter()
            .map(|device| (device.id.clone(), device))
            .collect();

        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Current record for a device, if registered
    pub async fn get(&self, device_id: &str) -> Option<Device> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// Add or replace a device record
    pub async fn insert(&self, device: Device) {
        self.devices.write().await.insert(device.id.clone(), device);
    }
}

#[async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn list_eligible(&self, filter: ProbeFilter) -> RegistryResult<Vec<Device>> {
        let devices = self.devices.read().await;

        Ok(devices
            .values()
            .filter(|device| filter.matches(device))
            .cloned()
            .collect())
    }

    async fn apply_check_result(
        &self,
        device_id: &str,
        result: &CheckResult,
    ) -> RegistryResult<()> {
        let mut devices = self.devices.write().await;

        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| RegistryError::UnknownDevice(device_id.to_string()))?;

        device.status = result.status;

        // last_seen and stored metrics only move when the device answered;
        // an offline cycle keeps the previous observations
        if result.reachable() {
            device.last_seen = Some(result.timestamp);
            device.metrics = result.metrics.clone();
        }

        debug!(
            "applied check result for {}: {:?}",
            device.display_name(),
            result.status
        );

        Ok(())
    }
}
