//! Task domain model.
//!
//! A Task is a named, reusable unit of work with a trigger, a type-specific
//! configuration, scheduling options, and an ordered list of outcome
//! handlers.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::HookEventType;
use super::handler::Handler;

/// Closed set of task type tags. The tag selects the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Run a shell command.
    Shell,
    /// Run an AI-agent prompt through the configured agent CLI.
    Agent,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Agent => "agent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "shell" => Some(Self::Shell),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

/// Type-specific task configuration. The variant is the single source of
/// truth for the task's type tag, so tag and payload cannot disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskConfig {
    Shell {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },
    Agent {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_turns: Option<u32>,
    },
}

impl TaskConfig {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Shell { .. } => TaskKind::Shell,
            Self::Agent { .. } => TaskKind::Agent,
        }
    }
}

/// The rule that causes a task to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Only explicit `task run` / dispatch requests.
    Manual,
    /// A cron expression evaluated by the scheduler's timer.
    Cron { schedule: String },
    /// Subscription to a hook event, with optional pattern filters over
    /// context fields. Filters are keyed by context field name; a task
    /// matches when every family matches (OR within a family, AND across
    /// families).
    Event {
        event: HookEventType,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        filters: HashMap<String, Vec<String>>,
    },
}

impl Trigger {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Cron { .. } => "cron",
            Self::Event { .. } => "event",
        }
    }

    /// The subscribed event type, for event triggers.
    pub fn event_type(&self) -> Option<HookEventType> {
        match self {
            Self::Event { event, .. } => Some(*event),
            _ => None,
        }
    }
}

/// Parse a cron expression, accepting both the classic 5-field form
/// (min hour dom month dow) and the 6/7-field form with seconds that the
/// cron crate expects. Five-field expressions get a `0` seconds column
/// prepended.
pub fn parse_cron_schedule(expression: &str) -> Result<cron::Schedule, cron::error::Error> {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        cron::Schedule::from_str(&format!("0 {}", trimmed))
    } else {
        cron::Schedule::from_str(trimmed)
    }
}

fn default_priority() -> i32 {
    0
}

/// Scheduling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Executor deadline; falls back to the per-type default when unset.
    pub timeout_ms: Option<u64>,
    /// Maximum simultaneous executions for this task (>= 1). Default 1.
    pub max_concurrent: Option<u32>,
    /// Park over-capacity dispatches instead of skipping them.
    pub queue: bool,
    /// Bound on parked dispatches; overflow is skipped.
    pub queue_limit: Option<usize>,
    /// Higher priority tasks are dispatched first on a shared event.
    pub priority: i32,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            max_concurrent: None,
            queue: false,
            queue_limit: None,
            priority: default_priority(),
        }
    }
}

impl TaskOptions {
    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent.unwrap_or(1).max(1)
    }
}

/// A named, reusable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Whether the task may be dispatched.
    pub enabled: bool,
    /// Type-specific configuration (also carries the type tag).
    pub config: TaskConfig,
    /// What causes this task to run.
    pub trigger: Trigger,
    /// Scheduling options.
    pub options: TaskOptions,
    /// Outcome handlers, run in declared order after every execution.
    pub handlers: Vec<Handler>,
    /// Total terminal executions that actually ran.
    pub run_count: u64,
    /// Successful executions.
    pub success_count: u64,
    /// Failed executions (failures and timeouts).
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(name: impl Into<String>, config: TaskConfig, trigger: Trigger) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            enabled: true,
            config,
            trigger,
            options: TaskOptions::default(),
            handlers: Vec::new(),
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.config.kind()
    }

    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate the task definition. Called at creation and update time;
    /// malformed tasks are rejected before they reach storage.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Task name cannot be empty".to_string());
        }
        match &self.config {
            TaskConfig::Shell { command, .. } if command.trim().is_empty() => {
                return Err("Shell task command cannot be empty".to_string());
            }
            TaskConfig::Agent { prompt, .. } if prompt.trim().is_empty() => {
                return Err("Agent task prompt cannot be empty".to_string());
            }
            _ => {}
        }
        if let Trigger::Cron { schedule } = &self.trigger {
            parse_cron_schedule(schedule)
                .map_err(|e| format!("Invalid cron schedule '{}': {}", schedule, e))?;
        }
        if let Some(max) = self.options.max_concurrent {
            if max == 0 {
                return Err("max_concurrent must be at least 1".to_string());
            }
        }
        if self.options.timeout_ms == Some(0) {
            return Err("timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}
