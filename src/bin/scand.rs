use std::sync::Arc;

use clap::Parser;
use fleetwatch::{
    config::read_config_file,
    probe::NetworkProber,
    registry::MemoryRegistry,
    scheduler::SchedulerHandle,
    snmp::SnmpClientFactory,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetwatch", LevelFilter::TRACE),
        ("scand", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let devices: Vec<_> = config
        .devices
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(Into::into)
        .collect();

    info!("monitoring {} devices", devices.len());

    let registry = Arc::new(MemoryRegistry::new(devices));
    let prober = Arc::new(NetworkProber::new(config.monitor.probe.clone()));

    let (event_tx, event_rx) = broadcast::channel(256);

    let scheduler = SchedulerHandle::spawn(
        &config.monitor,
        registry,
        prober,
        Arc::new(SnmpClientFactory),
        event_tx,
    );

    // stand-in for a transport layer: log every check result as it arrives
    tokio::spawn(log_check_events(event_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    scheduler.shutdown().await?;

    Ok(())
}

async fn log_check_events(mut event_rx: broadcast::Receiver<fleetwatch::scheduler::CheckEvent>) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                debug!(
                    "{}: {:?} ({} metrics{})",
                    event.display_name,
                    event.result.status,
                    event.result.metrics.len(),
                    event
                        .result
                        .failure
                        .map(|reason| format!(", reason: {reason}"))
                        .unwrap_or_default(),
                );
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                error!("event logger lagged, missed {missed} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
