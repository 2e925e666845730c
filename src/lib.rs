pub mod collector;
pub mod config;
pub mod error;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod snmp;
pub mod status;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProbeFailure;

/// Operational status of a device, derived from the most recent check.
///
/// `Unknown` means no check has completed yet (or the check itself could
/// not be executed), never "not scanned this cycle".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Warning,
    Unknown,
}

/// SNMP protocol version configured for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SnmpVersion {
    #[serde(rename = "1")]
    V1,
    #[default]
    #[serde(rename = "2c")]
    V2c,
}

/// Snapshot of a device as seen by the scan engine.
///
/// The registry owns the canonical record; the engine only reads a
/// snapshot per tick and never mutates it. Updates flow back as
/// [`CheckResult`] values through the registry interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier assigned by the registry
    pub id: String,

    /// Display name for logging
    pub name: Option<String>,

    /// Network address (IP or resolvable hostname)
    pub address: String,

    /// Whether the reachability probe runs for this device
    pub ping_enabled: bool,

    /// Whether metric collection runs for this device (after a successful probe)
    pub snmp_enabled: bool,

    /// SNMP community string
    pub snmp_community: Option<String>,

    /// SNMP protocol version
    pub snmp_version: SnmpVersion,

    /// SNMP agent port
    pub snmp_port: u16,

    /// Status derived from the most recent completed check
    pub status: DeviceStatus,

    /// Set only on successful reachability
    pub last_seen: Option<DateTime<Utc>>,

    /// Last collected metrics (attribute name -> string value)
    pub metrics: HashMap<String, String>,
}

impl Device {
    /// Name used in log output
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// Outcome of a single device check, produced once per device per tick.
///
/// Consumed exactly once by the registry update; the engine keeps no
/// history of past results.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    /// Derived status
    pub status: DeviceStatus,

    /// When the check completed
    pub timestamp: DateTime<Utc>,

    /// Partial collection result (only attributes that succeeded)
    pub metrics: HashMap<String, String>,

    /// Failure reason when the device was unreachable
    pub failure: Option<ProbeFailure>,
}

impl CheckResult {
    /// Result for a check that could not be executed at all
    pub fn not_executed() -> Self {
        Self {
            status: DeviceStatus::Unknown,
            timestamp: Utc::now(),
            metrics: HashMap::new(),
            failure: None,
        }
    }

    /// Did the device answer the reachability probe?
    pub fn reachable(&self) -> bool {
        matches!(self.status, DeviceStatus::Online | DeviceStatus::Warning)
    }
}
