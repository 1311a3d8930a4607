//! Application configuration

use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::TrackerError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Postgres connection string; when absent the service runs on the
    /// in-memory fallback store.
    pub url: Option<String>,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Cadence of the staleness sweep
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "MonitorConfig::default_sweep_interval")]
    pub sweep_interval: Duration,
    /// Maximum gap between updates before a vehicle is considered offline
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "MonitorConfig::default_liveness_threshold")]
    pub liveness_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Self::default_sweep_interval(),
            liveness_threshold: Self::default_liveness_threshold(),
        }
    }
}

impl MonitorConfig {
    fn default_sweep_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn default_liveness_threshold() -> Duration {
        Duration::from_secs(15)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("BUSTRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl MonitorConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.sweep_interval.is_zero() {
            return Err(TrackerError::ConfigurationError {
                message: "Sweep interval must be greater than zero".to_string(),
            });
        }
        if self.liveness_threshold.is_zero() {
            return Err(TrackerError::ConfigurationError {
                message: "Liveness threshold must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
