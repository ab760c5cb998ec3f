//! Curing recipe scheduler service (recipesrv)

use std::sync::Arc;

use clap::Parser;
use common::{shutdown_token, SystemClock};
use tracing::info;

use recipesrv::bootstrap::{self, Args, Command};
use recipesrv::{RecipesrvConfig, Runtime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = RecipesrvConfig::load(args.config.as_deref())?;
    bootstrap::initialize_logging(&args, &config)?;

    let pool = config.database.connect().await?;
    let runtime = Runtime::new(
        pool.clone(),
        config.scheduler.scheduler_config(),
        Arc::new(SystemClock),
    );

    match args.command() {
        Command::Run => {
            let shutdown = shutdown_token();
            let event_log = runtime.spawn_event_log(shutdown.child_token());
            runtime.scheduler.start(config.scheduler.period());

            shutdown.cancelled().await;
            info!("Shutdown requested");
            runtime.scheduler.stop().await;
            event_log.await?;
        },
        Command::Activate { id, user } => {
            let recipe = runtime.scheduler.activate_now(id, user.as_deref()).await?;
            println!("{}", serde_json::to_string(&recipe)?);
        },
        Command::History { limit } => {
            for entry in runtime.lifecycle.history(limit).await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        },
        Command::Tick => {
            let report = runtime.scheduler.run_once().await?;
            println!(
                "due={} activated={} failed={} abandoned={} skipped={}",
                report.due, report.activated, report.failed, report.abandoned, report.skipped
            );
        },
    }

    pool.close().await;
    Ok(())
}
