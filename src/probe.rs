//! Reachability probing
//!
//! A probe answers one question: does this device respond within the
//! timeout? Probes never fail outward - every error path resolves to
//! `Unreachable` with a classified reason. The probe enforces its own
//! deadline instead of relying on an external watchdog.
//!
//! Three strategies are available, chosen at runtime through the config:
//!
//! - `icmp-echo`: a real network echo. Requires raw-socket privileges
//!   (or an unprivileged ICMP sysctl) on most platforms.
//! - `tcp-connect`: connection-attempt fallback for environments without
//!   echo privileges. A completed handshake counts as reachable.
//! - `http-get`: probes with an HTTP request. Any response counts as
//!   reachable - the probe measures reachability, not application health.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, lookup_host};
use tracing::{debug, instrument, trace};

use crate::error::ProbeFailure;

/// Outcome of one reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }

    /// Failure reason, if any
    pub fn failure(&self) -> Option<ProbeFailure> {
        match self {
            ProbeOutcome::Reachable => None,
            ProbeOutcome::Unreachable(reason) => Some(*reason),
        }
    }
}

/// Something that can decide whether a device answers on the network.
///
/// The production implementation is [`NetworkProber`]; tests substitute
/// scripted probers so check pipelines run without any network access.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `address` with the given timeout budget.
    ///
    /// Must complete within `timeout` plus bounded overhead and must
    /// never panic or error outward.
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome;
}

/// Probe strategy, selected through the configuration file.
///
/// Tagged the same way as the rest of the config enums:
///
/// ```json
/// { "strategy": "tcp-connect", "port": 80 }
/// ```
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum ProbeStrategy {
    /// ICMP echo request
    IcmpEcho,

    /// TCP connection attempt against a fixed port
    TcpConnect {
        #[serde(default = "default_probe_port")]
        port: u16,
    },

    /// HTTP GET against a fixed port
    HttpGet {
        #[serde(default = "default_probe_port")]
        port: u16,
    },
}

impl Default for ProbeStrategy {
    fn default() -> Self {
        // works without privileges, so it is the safe default
        ProbeStrategy::TcpConnect {
            port: default_probe_port(),
        }
    }
}

fn default_probe_port() -> u16 {
    80
}

/// Production prober, polymorphic over [`ProbeStrategy`]
pub struct NetworkProber {
    strategy: ProbeStrategy,
    client: reqwest::Client,
}

impl NetworkProber {
    pub fn new(strategy: ProbeStrategy) -> Self {
        Self {
            strategy,
            // per-request timeouts are applied in probe(), not here
            client: reqwest::Client::new(),
        }
    }

    /// Resolve an address to a socket address, distinguishing resolution
    /// failures from the connection failures that follow.
    async fn resolve(&self, address: &str, port: u16) -> Result<SocketAddr, ProbeFailure> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        match lookup_host((address, port)).await {
            Ok(mut addrs) => addrs.next().ok_or(ProbeFailure::ResolutionFailure),
            Err(e) => {
                debug!("failed to resolve {address}: {e}");
                Err(ProbeFailure::ResolutionFailure)
            }
        }
    }

    async fn probe_icmp(&self, addr: IpAddr, timeout: Duration) -> ProbeOutcome {
        let payload = [0u8; 8];

        match tokio::time::timeout(timeout, surge_ping::ping(addr, &payload)).await {
            Ok(Ok((_packet, rtt))) => {
                trace!("{addr}: echo reply after {rtt:?}");
                ProbeOutcome::Reachable
            }
            Ok(Err(surge_ping::SurgeError::Timeout { .. })) => {
                ProbeOutcome::Unreachable(ProbeFailure::Timeout)
            }
            Ok(Err(e)) => {
                debug!("{addr}: echo probe failed: {e}");
                ProbeOutcome::Unreachable(ProbeFailure::Unexpected)
            }
            Err(_) => ProbeOutcome::Unreachable(ProbeFailure::Timeout),
        }
    }

    async fn probe_tcp(&self, addr: SocketAddr, timeout: Duration) -> ProbeOutcome {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => ProbeOutcome::Reachable,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                ProbeOutcome::Unreachable(ProbeFailure::Refused)
            }
            Ok(Err(e)) => {
                debug!("{addr}: connect failed: {e}");
                ProbeOutcome::Unreachable(ProbeFailure::Unexpected)
            }
            Err(_) => ProbeOutcome::Unreachable(ProbeFailure::Timeout),
        }
    }

    async fn probe_http(&self, address: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        let url = format!("http://{address}:{port}/");

        match self.client.get(&url).timeout(timeout).send().await {
            // any answer proves the device is on the network, even a 5xx
            Ok(response) => {
                trace!("{url}: answered with {}", response.status());
                ProbeOutcome::Reachable
            }
            Err(e) if e.is_timeout() => ProbeOutcome::Unreachable(ProbeFailure::Timeout),
            Err(e) if e.is_connect() => ProbeOutcome::Unreachable(ProbeFailure::Refused),
            Err(e) => {
                debug!("{url}: request failed: {e}");
                ProbeOutcome::Unreachable(ProbeFailure::Unexpected)
            }
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    #[instrument(skip(self, timeout), fields(address = %address))]
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        let attempt = async {
            match &self.strategy {
                ProbeStrategy::IcmpEcho => match self.resolve(address, 0).await {
                    Ok(addr) => self.probe_icmp(addr.ip(), timeout).await,
                    Err(reason) => ProbeOutcome::Unreachable(reason),
                },

                ProbeStrategy::TcpConnect { port } => match self.resolve(address, *port).await {
                    Ok(addr) => self.probe_tcp(addr, timeout).await,
                    Err(reason) => ProbeOutcome::Unreachable(reason),
                },

                ProbeStrategy::HttpGet { port } => match self.resolve(address, *port).await {
                    // resolved ahead of the request so resolution failures
                    // are classified instead of disappearing into reqwest
                    // errors
                    Ok(_) => self.probe_http(address, *port, timeout).await,
                    Err(reason) => ProbeOutcome::Unreachable(reason),
                },
            }
        };

        // the deadline covers the whole attempt, resolution included; a
        // stalled resolver must not extend the budget
        let outcome = match tokio::time::timeout(timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Unreachable(ProbeFailure::Timeout),
        };

        trace!("probe outcome: {outcome:?}");
        outcome
    }
}
