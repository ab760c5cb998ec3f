//! recipesrv configuration

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use common::LoggingSettings;
use errors::{config_error, VulcanResult};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;
use vulcan_recipes::SchedulerConfig;

pub const SERVICE_NAME: &str = "recipesrv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://vulcan.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Open the pool, creating the database file if needed, and migrate
    pub async fn connect(&self) -> VulcanResult<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&self.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await?;
        vulcan_recipes::migrate(&pool).await?;
        info!("Database ready: {}", self.url);
        Ok(pool)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub period_ms: u64,
    pub max_activation_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            period_ms: 10_000,
            max_activation_attempts: 5,
            retry_backoff_ms: 10_000,
        }
    }
}

impl SchedulerSettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_activation_attempts: self.max_activation_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipesrvConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerSettings,
    pub logging: LoggingSettings,
}

impl RecipesrvConfig {
    pub fn load(path: Option<&Path>) -> VulcanResult<Self> {
        let config: Self = common::load_config(SERVICE_NAME, path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VulcanResult<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(config_error!(
                "database.url '{}' is not a sqlite URL",
                self.database.url
            ));
        }
        if self.database.max_connections == 0 {
            return Err(config_error!("database.max_connections must be positive"));
        }
        if self.scheduler.period_ms == 0 {
            return Err(config_error!("scheduler.period_ms must be positive"));
        }
        if self.scheduler.max_activation_attempts == 0 {
            return Err(config_error!(
                "scheduler.max_activation_attempts must be at least 1"
            ));
        }
        Ok(())
    }
}
