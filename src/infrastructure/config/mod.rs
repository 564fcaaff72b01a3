//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::{Config, StorageConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker_pool_size must be at least 1")]
    InvalidWorkerPoolSize,

    #[error("Invalid timeout: {0} must be positive")]
    InvalidTimeout(&'static str),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Postgres storage is configured but this build ships the embedded SQLite backend only")]
    PostgresUnavailable,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .taskforge/config.yaml (project config)
    /// 3. .taskforge/local.yaml (local overrides, optional)
    /// 4. Environment variables (TASKFORGE_* prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".taskforge/config.yaml"))
            .merge(Yaml::file(".taskforge/local.yaml"))
            .merge(Env::prefixed("TASKFORGE_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.scheduler.worker_pool_size == 0 {
            return Err(ConfigError::InvalidWorkerPoolSize);
        }
        if config.scheduler.default_shell_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("default_shell_timeout_ms"));
        }
        if config.scheduler.default_agent_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("default_agent_timeout_ms"));
        }
        if config.scheduler.cron_tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout("cron_tick_interval_ms"));
        }

        match &config.storage {
            StorageConfig::Sqlite { path } => {
                if path.is_empty() {
                    return Err(ConfigError::EmptyDatabasePath);
                }
            }
            StorageConfig::Postgres { .. } => {
                return Err(ConfigError::PostgresUnavailable);
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
