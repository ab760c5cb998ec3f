//! Unified logging module for Vulcan services
//!
//! Console output uses a bracketed-level format; file output goes through a
//! daily rolling, non-blocking `tracing-appender` writer.

use std::path::PathBuf;
use std::sync::OnceLock;

use errors::{VulcanError, VulcanResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable overriding the log root directory
pub const LOG_DIR_ENV: &str = "VULCAN_LOG_DIR";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809000Z [INFO] Link connected`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Worker guards must outlive the subscriber, otherwise buffered lines are lost
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Resolve the log root directory
///
/// Priority:
/// 1. `VULCAN_LOG_DIR` environment variable
/// 2. `configured` directory (from config file or `--log-dir`)
/// 3. `logs`
pub fn resolve_log_root(configured: Option<&str>) -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            configured
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "plcsrv", "recipesrv"), also the file prefix
    pub service_name: String,
    /// Base directory for logs
    pub log_dir: PathBuf,
    /// Default filter level when `RUST_LOG` is unset
    pub level: String,
    /// Write the file log as JSON lines
    pub enable_json: bool,
    /// Mirror events to stdout
    pub console: bool,
    /// Rolled files kept on disk
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: resolve_log_root(None),
            level: "info".to_string(),
            enable_json: false,
            console: true,
            max_log_files: 30,
        }
    }
}

impl LogConfig {
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Filter directive used when `RUST_LOG` is absent
    pub fn default_directive(&self) -> String {
        format!("{},{}=debug", self.level, self.service_name)
    }

    /// Build from the `logging` section of a service config
    pub fn from_settings(service_name: impl Into<String>, settings: &LoggingSettings) -> Self {
        Self {
            service_name: service_name.into(),
            log_dir: resolve_log_root(settings.dir.as_deref()),
            level: settings.level.clone(),
            enable_json: settings.enable_json,
            console: true,
            max_log_files: settings.max_log_files,
        }
    }
}

/// `logging` section shared by service configuration files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: Option<String>,
    pub level: String,
    pub enable_json: bool,
    pub max_log_files: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
            enable_json: false,
            max_log_files: 30,
        }
    }
}

fn build_filter(config: &LogConfig) -> VulcanResult<EnvFilter> {
    let directive = std::env::var("RUST_LOG").unwrap_or_else(|_| config.default_directive());
    EnvFilter::try_new(&directive)
        .map_err(|e| VulcanError::Configuration(format!("Invalid log filter '{}': {}", directive, e)))
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> VulcanResult<()> {
    std::fs::create_dir_all(&config.log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(config.service_name.as_str())
        .filename_suffix("log")
        .max_log_files(config.max_log_files)
        .build(&config.log_dir)
        .map_err(|e| VulcanError::Configuration(format!("Log appender: {}", e)))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    GUARDS.get_or_init(|| Mutex::new(Vec::new())).lock().push(guard);

    let console_layer = config.console.then(|| {
        fmt::layer()
            .with_ansi(true)
            .event_format(BracketedLevelFormat)
            .boxed()
    });

    let file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_level(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(build_filter(&config)?)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| VulcanError::Configuration(format!("Logging already initialized: {}", e)))?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    Ok(())
}
