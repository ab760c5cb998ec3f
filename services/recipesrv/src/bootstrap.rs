//! Command-line arguments and logging bootstrap

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use common::logging::{init_with_config, LogConfig};
use errors::VulcanResult;

use crate::config::{RecipesrvConfig, SERVICE_NAME};

/// Command-line arguments for recipesrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "recipesrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Curing recipe scheduler service",
    long_about = None
)]
pub struct Args {
    /// Configuration file (default: config/recipesrv.yaml)
    #[arg(short = 'c', long, env = "RECIPESRV_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true)]
    pub log_level: Option<String>,

    /// Log directory, overridden by VULCAN_LOG_DIR
    #[arg(long, global = true)]
    pub log_dir: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the activation scheduler until shutdown (default)
    Run,
    /// Activate one recipe immediately
    Activate {
        id: i64,
        /// Operator recorded in the audit log
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Print the most recent audit entries as JSON lines
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Run a single scheduler tick and exit
    Tick,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

/// Initialize logging from the config file, with command-line overrides
///
/// One-shot commands log to the file only so stdout stays machine-readable.
pub fn initialize_logging(args: &Args, config: &RecipesrvConfig) -> VulcanResult<()> {
    let mut settings = config.logging.clone();
    if let Some(level) = &args.log_level {
        settings.level = level.clone();
    }
    if args.log_dir.is_some() {
        settings.dir = args.log_dir.clone();
    }
    let mut log_config = LogConfig::from_settings(SERVICE_NAME, &settings);
    log_config.console = args.command() == Command::Run;
    init_with_config(log_config)
}
