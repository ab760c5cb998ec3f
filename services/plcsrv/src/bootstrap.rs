//! Command-line arguments and logging bootstrap

use std::path::PathBuf;

use clap::Parser;
use common::logging::{init_with_config, LogConfig};
use errors::VulcanResult;

use crate::config::{PlcsrvConfig, SERVICE_NAME};

/// Command-line arguments for plcsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "plcsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Curing press acquisition service",
    long_about = None
)]
pub struct Args {
    /// Configuration file (default: config/plcsrv.yaml)
    #[arg(short = 'c', long, env = "PLCSRV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Log directory, overridden by VULCAN_LOG_DIR
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub validate: bool,
}

/// Initialize logging from the config file, with command-line overrides
pub fn initialize_logging(args: &Args, config: &PlcsrvConfig) -> VulcanResult<()> {
    let mut settings = config.logging.clone();
    if let Some(level) = &args.log_level {
        settings.level = level.clone();
    }
    if args.log_dir.is_some() {
        settings.dir = args.log_dir.clone();
    }
    init_with_config(LogConfig::from_settings(SERVICE_NAME, &settings))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "plcsrv",
            "--config",
            "/etc/vulcan/plcsrv.yaml",
            "-l",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/vulcan/plcsrv.yaml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(!args.validate);
    }
}
