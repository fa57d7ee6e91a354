//! Remote-procedure bridge for the DH AG-95 gripper.
//!
//! Serves the gripper operations over HTTP and drives the device over
//! Modbus RTU.

use ag95_bridge::config::BridgeConfig;
use ag95_bridge::rpc::RpcServer;
use ag95_bridge::sim::SimulatedGripper;
use ag95_bridge::{Connector, Gripper, LinkManager, LinkSettings, RoutineSettings, RtuConnector};
use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Remote-procedure bridge for the DH AG-95 gripper (Modbus RTU).
#[derive(Parser, Debug)]
#[command(name = "ag95-bridge")]
#[command(about = "Exposes the AG-95 gripper registers as remote procedures")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Override the RPC listen address.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Serve a simulated gripper instead of the serial port.
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => BridgeConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => BridgeConfig::default(),
    };

    // Initialize logging
    let log_config = config
        .logging
        .with_level_override(args.log_level.as_deref());
    ag95_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting ag95-bridge");
    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let listen = match args.listen {
        Some(addr) => addr,
        None => config.rpc.listen_addr()?,
    };

    if args.simulate {
        info!("Using simulated gripper");
        serve(SimulatedGripper::new().connector(), &config, listen).await
    } else {
        serve(RtuConnector::new(config.serial.clone()), &config, listen).await
    }
}

async fn serve<C: Connector>(connector: C, config: &BridgeConfig, listen: SocketAddr) -> Result<()> {
    let link = LinkManager::new(connector, LinkSettings::from(&config.link));
    let gripper = Arc::new(
        Gripper::new(link).with_routine_settings(RoutineSettings::from(&config.routines)),
    );

    // The link is also opened lazily by the first call.
    if !gripper.connect().await {
        warn!(
            "Gripper at {} not reachable yet, will retry on demand",
            gripper.link().endpoint()
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(RpcServer::new(gripper.clone(), listen).run(shutdown_rx));

    // Wait for shutdown signal, or for the server to stop on its own
    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            None
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
            None
        }
        joined = &mut server => Some(joined),
    };

    let result = match finished {
        Some(joined) => {
            let result = joined.map_err(anyhow::Error::from).and_then(|r| r);
            if let Err(e) = &result {
                error!("RPC server error: {:#}", e);
            }
            result
        }
        None => stop_server(&shutdown_tx, server).await,
    };

    gripper.link().disconnect().await;
    info!("ag95-bridge stopped");

    result
}

async fn stop_server(
    shutdown_tx: &watch::Sender<bool>,
    server: JoinHandle<Result<()>>,
) -> Result<()> {
    // The receiver is gone if the server already stopped; its result says why.
    let _ = shutdown_tx.send(true);
    server.await?
}

#[cfg(unix)]
async fn terminate() {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
