//! Helper mocks for integration tests
//!
//! The engine's seams (prober, protocol client, registry) all have
//! scripted stand-ins here so every scenario runs without network access.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fleetwatch::error::{QueryError, RegistryError, RegistryResult};
use fleetwatch::probe::{ProbeOutcome, Prober};
use fleetwatch::registry::{DeviceRegistry, ProbeFilter};
use fleetwatch::snmp::{AttributeClient, ProtocolFactory};
use fleetwatch::{CheckResult, Device, DeviceStatus, SnmpVersion};
use tokio::sync::Mutex;

pub fn make_device(id: &str, address: &str, ping: bool, snmp: bool) -> Device {
    Device {
        id: id.to_string(),
        name: Some(format!("Test {id}")),
        address: address.to_string(),
        ping_enabled: ping,
        snmp_enabled: snmp,
        snmp_community: Some("public".to_string()),
        snmp_version: SnmpVersion::V2c,
        snmp_port: 161,
        status: DeviceStatus::Unknown,
        last_seen: None,
        metrics: HashMap::new(),
    }
}

/// Prober answering from a script instead of the network.
///
/// Tracks how many probes run simultaneously so limiter tests can assert
/// the configured bound.
pub struct ScriptedProber {
    outcomes: HashMap<String, ProbeOutcome>,
    delay: Option<Duration>,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl ScriptedProber {
    /// Everything reachable unless scripted otherwise
    pub fn reachable() -> Self {
        Self {
            outcomes: HashMap::new(),
            delay: None,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_outcome(mut self, address: &str, outcome: ProbeOutcome) -> Self {
        self.outcomes.insert(address.to_string(), outcome);
        self
    }

    /// Make every probe take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, address: &str, _timeout: Duration) -> ProbeOutcome {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        self.outcomes
            .get(address)
            .copied()
            .unwrap_or(ProbeOutcome::Reachable)
    }
}

/// Scripted management-protocol agent.
///
/// Keys with a response answer immediately; keys marked flaky fail a set
/// number of attempts first; unknown keys hang until the collector's
/// per-attempt timeout fires.
#[derive(Default)]
pub struct ScriptedAgent {
    responses: HashMap<String, String>,

    /// key -> remaining failures before the scripted answer is given
    flaky: Mutex<HashMap<String, usize>>,

    /// keys that fail immediately instead of hanging
    rejected: HashSet<String>,

    attempts: Mutex<HashMap<String, usize>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, key: &str, value: &str) -> Self {
        self.responses.insert(key.to_string(), value.to_string());
        self
    }

    /// Respond with `value`, but only after failing `failures` attempts
    pub fn with_flaky_response(self, key: &str, value: &str, failures: usize) -> Self {
        let this = self.with_response(key, value);
        this.flaky
            .try_lock()
            .expect("setup is single threaded")
            .insert(key.to_string(), failures);
        this
    }

    /// Fail this key immediately (wrong credential, no such object)
    pub fn with_rejection(mut self, key: &str) -> Self {
        self.rejected.insert(key.to_string());
        self
    }

    pub async fn attempts_for(&self, key: &str) -> usize {
        self.attempts.lock().await.get(key).copied().unwrap_or(0)
    }

    async fn query(&self, key: &str) -> Result<String, QueryError> {
        *self
            .attempts
            .lock()
            .await
            .entry(key.to_string())
            .or_insert(0) += 1;

        if self.rejected.contains(key) {
            return Err(QueryError::Protocol("no such object".to_string()));
        }

        if let Some(remaining) = self.flaky.lock().await.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(QueryError::Protocol("simulated transient fault".to_string()));
            }
        }

        match self.responses.get(key) {
            Some(value) => Ok(value.clone()),
            // no script for this key: hang until the collector times out
            None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Factory handing out clients backed by one shared [`ScriptedAgent`]
pub struct ScriptedFactory {
    pub agent: Arc<ScriptedAgent>,
    pub sessions_opened: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(agent: ScriptedAgent) -> Self {
        Self {
            agent: Arc::new(agent),
            sessions_opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ProtocolFactory for ScriptedFactory {
    async fn open(
        &self,
        _device: &Device,
        _timeout: Duration,
    ) -> Result<Box<dyn AttributeClient>, QueryError> {
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SharedAgent(self.agent.clone())))
    }
}

struct SharedAgent(Arc<ScriptedAgent>);

#[async_trait]
impl AttributeClient for SharedAgent {
    async fn query(&self, key: &str) -> Result<String, QueryError> {
        self.0.query(key).await
    }
}

/// Registry wrapper that counts enumerations and records every applied
/// result, with an optional simulated outage.
pub struct CountingRegistry {
    devices: Vec<Device>,
    pub list_calls: AtomicUsize,
    pub fail_next_list: AtomicBool,
    pub applied: Mutex<Vec<(String, CheckResult)>>,
}

impl CountingRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            list_calls: AtomicUsize::new(0),
            fail_next_list: AtomicBool::new(false),
            applied: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DeviceRegistry for CountingRegistry {
    async fn list_eligible(&self, filter: ProbeFilter) -> RegistryResult<Vec<Device>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_next_list.swap(false, Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("simulated outage".to_string()));
        }

        Ok(self
            .devices
            .iter()
            .filter(|device| match filter {
                ProbeFilter::Ping => device.ping_enabled,
                ProbeFilter::Collection => device.snmp_enabled,
                ProbeFilter::Any => device.ping_enabled || device.snmp_enabled,
            })
            .cloned()
            .collect())
    }

    async fn apply_check_result(
        &self,
        device_id: &str,
        result: &CheckResult,
    ) -> RegistryResult<()> {
        self.applied
            .lock()
            .await
            .push((device_id.to_string(), result.clone()));
        Ok(())
    }
}
