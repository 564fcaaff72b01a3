//! Application configuration model.
//!
//! Loaded by the infrastructure config loader (defaults, YAML files,
//! environment variables) and validated before services start.

use serde::{Deserialize, Serialize};

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Embedded file-based store.
    Sqlite { path: String },
    /// Networked SQL store.
    Postgres { url: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: ".taskforge/taskforge.db".to_string(),
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Shared dispatch worker pool size.
    pub worker_pool_size: usize,
    /// Default deadline for shell tasks.
    pub default_shell_timeout_ms: u64,
    /// Default deadline for agent tasks.
    pub default_agent_timeout_ms: u64,
    /// Grace period between a cancel signal and a unilateral `cancelled`.
    pub cancel_grace_ms: u64,
    /// Default bound on parked dispatches per task.
    pub queue_limit: usize,
    /// Cron timer tick interval.
    pub cron_tick_interval_ms: u64,
    /// How often the cron timer reloads schedules from storage.
    pub cron_refresh_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 16,
            default_shell_timeout_ms: 120_000,
            default_agent_timeout_ms: 300_000,
            cancel_grace_ms: 5_000,
            queue_limit: 16,
            cron_tick_interval_ms: 1_000,
            cron_refresh_interval_ms: 30_000,
        }
    }
}

/// Agent executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent CLI binary.
    pub command: String,
    /// Extra arguments placed before the prompt.
    pub args: Vec<String>,
    /// Global cap on simultaneous agent executions.
    pub max_concurrent: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["--print".to_string()],
            max_concurrent: 2,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// json | pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}
