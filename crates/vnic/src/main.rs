//! Virtual NIC daemon
//!
//! Joins the networks listed in the configuration file, binds their
//! addresses, and drives interface state sampling and multicast membership
//! scans until interrupted.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vnic::config_file::DEFAULT_CONFIG_PATH;
use vnic::{LoggingEventSink, NodeDriver, SimulatedStack, VnicConfig, frame_handler};

/// Virtual network interface daemon
#[derive(Parser, Debug)]
#[command(name = "vnicd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level, overriding the configuration file (RUST_LOG wins over both)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = VnicConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level)?;

    config.validate().context("invalid configuration")?;
    if args.check {
        info!(networks = config.networks.len(), "vnicd: Configuration OK");
        return Ok(());
    }

    info!("vnicd: Starting virtual network interface daemon");

    match run_daemon(config).await {
        Ok(()) => {
            info!("vnicd: Daemon exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "vnicd: Daemon exiting with error");
            Err(e)
        }
    }
}

/// Initialize structured logging. RUST_LOG takes precedence over `level`.
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("bad log filter {:?}", level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set logger: {}", e))?;

    Ok(())
}

async fn run_daemon(config: VnicConfig) -> anyhow::Result<()> {
    let stack = Arc::new(SimulatedStack::new());
    let mut driver = NodeDriver::new(stack, Arc::new(LoggingEventSink));

    for network in &config.networks {
        let handler = frame_handler(|nwid, frame| {
            tracing::debug!(
                nwid = %nwid,
                dst = %frame.dst,
                ether_type = frame.ether_type,
                len = frame.payload.len(),
                "Outbound frame"
            );
        });
        let controller = driver
            .join_network(config.join_params(network, handler))
            .with_context(|| format!("joining network {}", network.id))?;

        for ip in &network.addresses {
            if let Err(e) = controller.add_ip(*ip) {
                warn!(nwid = %network.id, ip = %ip, error = %e, "vnicd: Failed to bind address");
            }
        }
        info!(
            nwid = %network.id,
            device = controller.device_name(),
            addresses = controller.ips().len(),
            "vnicd: Network ready"
        );
    }

    let mut ticker = tokio::time::interval(config.node_tick());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(networks = driver.network_ids().len(), "vnicd: Running");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                driver.tick();
            }
            res = signal::ctrl_c() => {
                res.context("waiting for shutdown signal")?;
                info!("vnicd: Received SIGINT");
                break;
            }
        }
    }

    // Each leave joins a std thread; keep that off the async workers.
    tokio::task::spawn_blocking(move || driver.leave_all())
        .await
        .context("leaving networks")?;

    info!("vnicd: Graceful shutdown complete");
    Ok(())
}
