//! Curing press acquisition service (plcsrv)
//!
//! Two independent tasks: the link supervisor reconnects to the controller
//! with a fixed delay, and the acquisition loop samples once per period.

use std::sync::Arc;

use clap::Parser;
use common::{shutdown_token, SystemClock};
use tracing::{error, info};
use vulcan_modbus::{run_supervisor, AcquisitionLoop, LinkSession, TcpTransport};

use plcsrv::bootstrap::{self, Args};
use plcsrv::{HttpReadingSink, PlcsrvConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = PlcsrvConfig::load(args.config.as_deref())?;

    if args.validate {
        println!("Configuration OK");
        return Ok(());
    }

    bootstrap::initialize_logging(&args, &config)?;
    info!(
        "plcsrv starting: controller {}:{} unit {}, backend {}",
        config.link.host, config.link.port, config.link.unit_id, config.ingest.url
    );

    let session = Arc::new(LinkSession::new(
        TcpTransport::new(config.link.endpoint()),
        Some(config.registers.enable_coil),
    ));
    let sink = Arc::new(HttpReadingSink::new(&config.ingest)?);
    let acquisition = AcquisitionLoop::new(
        session.clone(),
        config.registers.clone(),
        sink,
        Arc::new(SystemClock),
    );

    let shutdown = shutdown_token();
    let supervisor = tokio::spawn(run_supervisor(
        session.clone(),
        config.link.retry_delay(),
        shutdown.child_token(),
    ));
    acquisition.start(config.period());

    shutdown.cancelled().await;
    info!("Shutdown requested");

    acquisition.stop().await;
    if let Err(e) = supervisor.await {
        error!("Link supervisor ended abnormally: {}", e);
    }

    let stats = session.stats();
    info!(
        "plcsrv stopped: {} connect attempts, {} connects, {} read failures",
        stats.connect_attempts, stats.successful_connects, stats.read_failures
    );
    Ok(())
}
