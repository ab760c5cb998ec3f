//! plcsrv configuration
//!
//! Loaded with [`common::load_config`]: defaults, then `config/plcsrv.yaml`,
//! then `PLCSRV_*` environment variables.

use std::path::Path;
use std::time::Duration;

use common::LoggingSettings;
use errors::{config_error, VulcanResult};
use serde::{Deserialize, Serialize};
use vulcan_modbus::{RegisterMap, TcpEndpoint};

pub const SERVICE_NAME: &str = "plcsrv";

/// Controller link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub connect_timeout_ms: u64,
    /// Fixed wait between reconnect attempts
    pub retry_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            connect_timeout_ms: 3000,
            retry_delay_ms: 2000,
        }
    }
}

impl LinkConfig {
    pub fn endpoint(&self) -> TcpEndpoint {
        TcpEndpoint {
            host: self.host.clone(),
            port: self.port,
            unit_id: self.unit_id,
            timeout_ms: self.connect_timeout_ms,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub period_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

/// Backend that receives readings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/data".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlcsrvConfig {
    pub link: LinkConfig,
    pub registers: RegisterMap,
    pub acquisition: AcquisitionConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingSettings,
}

impl PlcsrvConfig {
    pub fn load(path: Option<&Path>) -> VulcanResult<Self> {
        let config: Self = common::load_config(SERVICE_NAME, path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VulcanResult<()> {
        if self.link.host.trim().is_empty() {
            return Err(config_error!("link.host must not be empty"));
        }
        if self.link.port == 0 {
            return Err(config_error!("link.port must not be 0"));
        }
        if self.link.connect_timeout_ms == 0 {
            return Err(config_error!("link.connect_timeout_ms must be positive"));
        }
        if self.acquisition.period_ms == 0 {
            return Err(config_error!("acquisition.period_ms must be positive"));
        }
        if !self.ingest.url.starts_with("http://") && !self.ingest.url.starts_with("https://") {
            return Err(config_error!(
                "ingest.url '{}' is not an http(s) URL",
                self.ingest.url
            ));
        }
        let temperature_end = u32::from(self.registers.temperature_address) + 1;
        if temperature_end > u32::from(u16::MAX) {
            return Err(config_error!(
                "registers.temperature_address {} leaves no room for the second word",
                self.registers.temperature_address
            ));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.acquisition.period_ms)
    }
}
