//! Scan scheduling and concurrency limiting
//!
//! The scheduler drives the whole engine: a periodic timer fires a
//! fleet-wide scan, each eligible device becomes one independent check
//! task, and a semaphore bounds how many checks run at once so a large
//! fleet cannot exhaust sockets or protocol sessions.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → enumerate devices → per device (bounded):
//!     probe → collect → evaluate → apply to registry + publish CheckEvent
//!     ↑
//!     └─── Commands (ScanNow, Shutdown)
//! ```
//!
//! A tick that fires while the previous scan is still running is skipped,
//! never queued - stacking fleet scans would only compound load during an
//! already-slow cycle. A scan counts as finished only once every
//! dispatched check has completed; no check is abandoned mid-flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, instrument, trace, warn};

use crate::collector::MetricCollector;
use crate::config::MonitorConfig;
use crate::probe::Prober;
use crate::registry::{DeviceRegistry, ProbeFilter};
use crate::snmp::ProtocolFactory;
use crate::status;
use crate::{CheckResult, Device};

/// Event published once per completed device check, as soon as the result
/// is ready. Transport layers (API, logging, alerting) subscribe here
/// without coupling to scan internals.
#[derive(Debug, Clone)]
pub struct CheckEvent {
    pub device_id: String,

    /// Display name for logging
    pub display_name: String,

    pub result: CheckResult,
}

/// Commands that can be sent to the ScanScheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a fleet scan immediately (bypassing the interval timer).
    ///
    /// Answers with an error if a scan is already in progress - scans
    /// never stack.
    ScanNow {
        respond_to: oneshot::Sender<Result<()>>,
    },

    /// Gracefully shut down; a running scan is allowed to finish
    Shutdown,
}

/// Everything one device-check task needs. Cheap to clone; holds only
/// shared handles plus copied timeouts.
#[derive(Clone)]
struct ScanContext {
    registry: Arc<dyn DeviceRegistry>,
    prober: Arc<dyn Prober>,
    collector: Arc<MetricCollector>,

    /// The only state shared across concurrent checks
    limiter: Arc<Semaphore>,

    event_tx: broadcast::Sender<CheckEvent>,
    probe_timeout: Duration,
    slow_check_threshold: Duration,
}

/// Actor running the periodic scan cycle
pub struct ScanScheduler {
    ctx: ScanContext,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    interval_duration: Duration,
}

impl ScanScheduler {
    /// Run the actor's main loop.
    ///
    /// One scan cycle is IDLE -> RUNNING -> IDLE; `in_flight` holds the
    /// task of the RUNNING scan, if any.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting scan scheduler with interval {:?}",
            self.interval_duration
        );

        // first tick after one full interval, not at startup
        let start = tokio::time::Instant::now() + self.interval_duration;
        let mut ticker = tokio::time::interval_at(start, self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: Option<tokio::task::JoinHandle<()>> = None;

        loop {
            let scan_running = in_flight
                .as_ref()
                .is_some_and(|handle| !handle.is_finished());

            tokio::select! {
                // Timer tick - fire a fleet scan
                _ = ticker.tick() => {
                    if scan_running {
                        warn!("previous scan still running, skipping this tick");
                        continue;
                    }

                    let ctx = self.ctx.clone();
                    in_flight = Some(tokio::spawn(async move {
                        if let Err(e) = run_scan(ctx).await {
                            error!("scan aborted: {e:#}");
                        }
                    }));
                }

                // Handle commands
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::ScanNow { respond_to }) => {
                            debug!("received ScanNow command");

                            if scan_running {
                                let _ = respond_to
                                    .send(Err(anyhow::anyhow!("scan already in progress")));
                                continue;
                            }

                            let ctx = self.ctx.clone();
                            in_flight = Some(tokio::spawn(async move {
                                let result = run_scan(ctx).await;
                                let _ = respond_to.send(result);
                            }));
                        }

                        Some(SchedulerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        // every handle has been dropped, nobody can reach
                        // this actor anymore
                        None => {
                            debug!("all handles dropped, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        // a running scan finishes its dispatched checks before we exit
        if let Some(handle) = in_flight {
            let _ = handle.await;
        }

        debug!("scan scheduler stopped");
    }
}

/// One fleet scan: enumerate, dispatch, drain.
///
/// Registry enumeration failure aborts this scan only; the scheduler
/// stays up and the next tick retries from scratch.
#[instrument(skip_all)]
async fn run_scan(ctx: ScanContext) -> Result<()> {
    let scan_started = Instant::now();

    let devices = ctx
        .registry
        .list_eligible(ProbeFilter::Any)
        .await
        .context("failed to enumerate devices")?;

    debug!("scanning {} devices", devices.len());

    let mut checks = JoinSet::new();
    for device in devices {
        checks.spawn(check_task(ctx.clone(), device));
    }

    // the scan is done only when every dispatched check has finished
    while let Some(joined) = checks.join_next().await {
        if let Err(e) = joined {
            error!("device check task failed: {e}");
        }
    }

    debug!("scan finished in {:?}", scan_started.elapsed());
    Ok(())
}

/// One device check behind the limiter.
///
/// The owned permit is released by drop on every exit path. Nothing a
/// single device does here can propagate to other checks or to the
/// scheduler loop.
async fn check_task(ctx: ScanContext, device: Device) {
    let Ok(_permit) = ctx.limiter.clone().acquire_owned().await else {
        // semaphore closed, engine is shutting down
        return;
    };

    let started = Instant::now();
    let result = run_check(&ctx, &device).await;
    let elapsed = started.elapsed();

    if elapsed > ctx.slow_check_threshold {
        warn!(
            "check for {} took {elapsed:?} (threshold {:?})",
            device.display_name(),
            ctx.slow_check_threshold
        );
    }

    // incremental delivery: each result goes out as soon as it is ready,
    // not batched at scan end
    if let Err(e) = ctx.registry.apply_check_result(&device.id, &result).await {
        error!(
            "failed to apply check result for {}: {e}",
            device.display_name()
        );
    }

    let event = CheckEvent {
        device_id: device.id.clone(),
        display_name: device.display_name().to_string(),
        result,
    };

    if ctx.event_tx.send(event).is_err() {
        trace!("no subscribers for check event (this is OK)");
    }
}

/// Probe -> (conditional) collect -> evaluate, as one unit of work over an
/// immutable device snapshot.
#[instrument(skip_all, fields(device = %device.display_name()))]
async fn run_check(ctx: &ScanContext, device: &Device) -> CheckResult {
    if !device.ping_enabled && !device.snmp_enabled {
        // nothing to execute for this device
        return CheckResult::not_executed();
    }

    let outcome = ctx.prober.probe(&device.address, ctx.probe_timeout).await;

    // collection only after a successful probe, with collection enabled
    // and a credential present
    let collection_attempted =
        outcome.is_reachable() && device.snmp_enabled && device.snmp_community.is_some();

    let metrics = if collection_attempted {
        ctx.collector.collect(device).await
    } else {
        HashMap::new()
    };

    let status = status::evaluate(Some(outcome), collection_attempted, !metrics.is_empty());

    trace!("check finished: {status:?}");

    CheckResult {
        status,
        timestamp: Utc::now(),
        metrics,
        failure: outcome.failure(),
    }
}

/// Handle for controlling a ScanScheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Assemble the engine from its collaborators and spawn the scheduler
    /// as a tokio task.
    pub fn spawn(
        config: &MonitorConfig,
        registry: Arc<dyn DeviceRegistry>,
        prober: Arc<dyn Prober>,
        factory: Arc<dyn ProtocolFactory>,
        event_tx: broadcast::Sender<CheckEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let collector = Arc::new(MetricCollector::new(
            factory,
            config.attribute_set(),
            config.query_timeout(),
            config.query_retries,
        ));

        let ctx = ScanContext {
            registry,
            prober,
            collector,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_checks)),
            event_tx,
            probe_timeout: config.probe_timeout(),
            slow_check_threshold: config.slow_check_threshold(),
        };

        let scheduler = ScanScheduler {
            ctx,
            command_rx: cmd_rx,
            interval_duration: config.scan_interval(),
        };

        tokio::spawn(scheduler.run());

        Self { sender: cmd_tx }
    }

    /// Run a fleet scan immediately and wait for it to complete.
    ///
    /// Errors if a scan is already running or if device enumeration
    /// failed.
    pub async fn scan_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::ScanNow { respond_to: tx })
            .await
            .context("failed to send ScanNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Gracefully shut down the scheduler
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
