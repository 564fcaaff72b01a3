//! Storage contract.
//!
//! The core depends on this trait only; concrete backends (embedded
//! SQLite, networked Postgres) are pluggable adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Execution, ExecutionStatus, HookEventType, Task, TaskKind};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub enabled: Option<bool>,
    pub kind: Option<TaskKind>,
    /// "manual" | "cron" | "event"
    pub trigger_type: Option<&'static str>,
    pub trigger_event: Option<HookEventType>,
}

impl TaskFilter {
    /// Enabled tasks subscribed to a hook event.
    pub fn subscribers(event: HookEventType) -> Self {
        Self {
            enabled: Some(true),
            trigger_type: Some("event"),
            trigger_event: Some(event),
            ..Default::default()
        }
    }

    /// Enabled tasks with a cron trigger.
    pub fn cron_tasks() -> Self {
        Self {
            enabled: Some(true),
            trigger_type: Some("cron"),
            ..Default::default()
        }
    }
}

/// Filter criteria for listing executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub task_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Live view of a running execution's streamed output.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionProgress {
    pub output: String,
    pub thinking: String,
    pub status: ExecutionStatus,
}

/// Aggregate statistics for one task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub average_duration_ms: Option<f64>,
    pub total_cost_usd: Option<f64>,
}

/// Persistence contract for tasks and executions.
///
/// Every call is atomic on its own; `finalize_execution` additionally
/// groups the terminal execution write with the task counter update in a
/// single transaction so counters stay consistent with execution rows.
#[async_trait]
pub trait Storage: Send + Sync {
    // -- Tasks --
    async fn create_task(&self, task: &Task) -> DomainResult<()>;
    async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>>;
    async fn update_task(&self, task: &Task) -> DomainResult<()>;
    async fn delete_task(&self, id: Uuid) -> DomainResult<()>;
    async fn load_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    // -- Executions --
    async fn create_execution(&self, execution: &Execution) -> DomainResult<()>;
    async fn get_execution(&self, id: Uuid) -> DomainResult<Option<Execution>>;
    async fn update_execution(&self, execution: &Execution) -> DomainResult<()>;
    async fn load_executions(&self, filter: ExecutionFilter) -> DomainResult<Vec<Execution>>;

    /// Write a terminal execution and bump the owning task's counters in
    /// one transaction. `run_count` counts executions that actually ran;
    /// `success_count`/`failure_count` follow the terminal status
    /// (timeouts count as failures, skips and cancels bump neither).
    async fn finalize_execution(&self, execution: &Execution) -> DomainResult<()>;

    // -- Streaming --
    async fn append_execution_output(&self, id: Uuid, text: &str) -> DomainResult<()>;
    async fn append_execution_thinking(&self, id: Uuid, text: &str) -> DomainResult<()>;
    async fn get_execution_progress(&self, id: Uuid) -> DomainResult<Option<ExecutionProgress>>;

    // -- Stats --
    async fn get_task_stats(&self, task_id: Uuid) -> DomainResult<TaskStats>;

    /// Startup reconciliation: mark executions left in non-terminal states
    /// as failed with a recovery note. Returns the number swept.
    async fn sweep_stale_executions(&self, note: &str) -> DomainResult<u64>;

    async fn close(&self) -> DomainResult<()>;
}
