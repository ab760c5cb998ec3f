//! Vulcan basic library
//!
//! Provides basic functions shared by all services, including:
//! - logging bootstrap
//! - layered configuration loading
//! - graceful shutdown signal
//! - wall-clock abstraction
//! - fixed-delay reconnection helper

pub mod config_loader;
pub mod logging;
pub mod reconnect;
pub mod shutdown;
pub mod time;

pub use config_loader::load_config;
pub use logging::{LogConfig, LoggingSettings};
pub use reconnect::{ReconnectError, ReconnectHelper};
pub use shutdown::{shutdown_token, wait_for_shutdown};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
