use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::trace;

use crate::probe::ProbeStrategy;
use crate::{Device, DeviceStatus, SnmpVersion};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub devices: Option<Vec<DeviceConfig>>,

    /// Engine tuning (optional - defaults match a small fleet)
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Tunables of the scan engine. Nothing in the engine is hardcoded;
/// every timeout and bound comes from here.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// Seconds between fleet-wide scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Reachability probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Per-attempt attribute query timeout in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,

    /// Extra attempts per attribute after the first one
    #[serde(default = "default_query_retries")]
    pub query_retries: usize,

    /// Maximum device checks in flight at once
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,

    /// Warn when a single device check takes longer than this (seconds)
    #[serde(default = "default_slow_check_threshold")]
    pub slow_check_threshold: u64,

    /// Reachability probe strategy
    #[serde(default)]
    pub probe: ProbeStrategy,

    /// Attribute name -> protocol query key. Defaults to the MIB-II
    /// system group entries common across vendors.
    pub attributes: Option<BTreeMap<String, String>>,
}

impl MonitorConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn slow_check_threshold(&self) -> Duration {
        Duration::from_secs(self.slow_check_threshold)
    }

    /// Configured attribute set, or the built-in default
    pub fn attribute_set(&self) -> BTreeMap<String, String> {
        self.attributes
            .clone()
            .unwrap_or_else(default_attributes)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            probe_timeout: default_probe_timeout(),
            query_timeout: default_query_timeout(),
            query_retries: default_query_retries(),
            max_concurrent_checks: default_max_concurrent_checks(),
            slow_check_threshold: default_slow_check_threshold(),
            probe: ProbeStrategy::default(),
            attributes: None,
        }
    }
}

/// Device entry in the config file, turned into a registry record at startup
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DeviceConfig {
    /// Stable id; defaults to the address when omitted
    pub id: Option<String>,

    pub name: Option<String>,

    /// IP address or resolvable hostname
    pub address: String,

    #[serde(default = "default_true")]
    pub ping_enabled: bool,

    #[serde(default = "default_true")]
    pub snmp_enabled: bool,

    pub snmp_community: Option<String>,

    #[serde(default)]
    pub snmp_version: SnmpVersion,

    #[serde(default = "default_snmp_port")]
    pub snmp_port: u16,
}

impl From<DeviceConfig> for Device {
    fn from(config: DeviceConfig) -> Self {
        Device {
            id: config.id.unwrap_or_else(|| config.address.clone()),
            name: config.name,
            address: config.address,
            ping_enabled: config.ping_enabled,
            snmp_enabled: config.snmp_enabled,
            snmp_community: config.snmp_community,
            snmp_version: config.snmp_version,
            snmp_port: config.snmp_port,
            status: DeviceStatus::Unknown,
            last_seen: None,
            metrics: HashMap::new(),
        }
    }
}

fn default_scan_interval() -> u64 {
    300
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_query_timeout() -> u64 {
    2
}

fn default_query_retries() -> usize {
    1
}

fn default_max_concurrent_checks() -> usize {
    32
}

fn default_slow_check_threshold() -> u64 {
    10
}

fn default_snmp_port() -> u16 {
    161
}

fn default_true() -> bool {
    true
}

/// The system group entries every vendor answers
fn default_attributes() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("sysDescr".to_string(), "1.3.6.1.2.1.1.1.0".to_string()),
        ("sysUpTime".to_string(), "1.3.6.1.2.1.1.3.0".to_string()),
        ("sysContact".to_string(), "1.3.6.1.2.1.1.4.0".to_string()),
        ("sysName".to_string(), "1.3.6.1.2.1.1.5.0".to_string()),
    ])
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
