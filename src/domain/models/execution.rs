//! Execution domain model.
//!
//! An Execution is a single attempt to run a Task. It is created `pending`
//! just before dispatch, transitions to `running` on executor entry, and is
//! immutable once terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::EventContext;

/// Status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet dispatched to an executor.
    Pending,
    /// Executor is working.
    Running,
    /// Executor finished with a successful result.
    Success,
    /// Executor finished with an error or non-zero exit.
    Failure,
    /// Deadline exceeded.
    Timeout,
    /// Cancelled externally or during shutdown.
    Cancelled,
    /// Never dispatched (capacity exceeded, task disabled, queue full).
    Skipped,
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failure" | "failed" => Some(Self::Failure),
            "timeout" => Some(Self::Timeout),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Terminal states are final; the execution is never updated afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failure | Self::Timeout | Self::Cancelled | Self::Skipped
        )
    }

    /// Whether the execution actually ran (reached an executor).
    pub fn ran(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failure | Self::Timeout | Self::Cancelled
        )
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [ExecutionStatus] {
        match self {
            Self::Pending => &[
                Self::Running,
                Self::Skipped,
                Self::Failure,
                Self::Cancelled,
            ],
            Self::Running => &[Self::Success, Self::Failure, Self::Timeout, Self::Cancelled],
            _ => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// How an execution was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Cron,
    Event,
    Retry,
    Chain,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Cron => "cron",
            Self::Event => "event",
            Self::Retry => "retry",
            Self::Chain => "chain",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "cron" => Some(Self::Cron),
            "event" => Some(Self::Event),
            "retry" => Some(Self::Retry),
            "chain" => Some(Self::Chain),
            _ => None,
        }
    }
}

/// Executor-reported usage extras (token counts, cost, tool calls).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<String>,
}

impl UsageInfo {
    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none()
            && self.output_tokens.is_none()
            && self.cost_usd.is_none()
            && self.tool_calls.is_empty()
    }
}

/// Terminal outcome reported by an executor.
///
/// The scheduler maps this onto the execution; executors never write
/// terminal status themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Success,
    Failure,
    Timeout,
    Cancelled,
}

impl From<ResultStatus> for ExecutionStatus {
    fn from(s: ResultStatus) -> Self {
        match s {
            ResultStatus::Success => Self::Success,
            ResultStatus::Failure => Self::Failure,
            ResultStatus::Timeout => Self::Timeout,
            ResultStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// What an executor hands back to the scheduler.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ResultStatus,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: i64,
    pub usage: Option<UsageInfo>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            status: ResultStatus::Success,
            output: output.into(),
            error: None,
            exit_code: Some(0),
            duration_ms,
            usage: None,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            status: ResultStatus::Failure,
            output: String::new(),
            error: Some(error.into()),
            exit_code: None,
            duration_ms,
            usage: None,
        }
    }
}

/// A single attempt to run a Task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique identifier.
    pub id: Uuid,
    /// Task this execution belongs to.
    pub task_id: Uuid,
    /// How this execution was triggered.
    pub trigger_type: TriggerType,
    /// Trigger metadata. For retries it carries `retry_count`,
    /// `previous_execution_id` and `previous_error`.
    pub trigger_context: EventContext,
    /// Current status.
    pub status: ExecutionStatus,
    /// Captured output.
    pub output: String,
    /// Captured thinking/reasoning stream (agent executors).
    pub thinking: String,
    /// Error message for non-success outcomes.
    pub error: Option<String>,
    /// Process exit code, when the executor ran a process.
    pub exit_code: Option<i32>,
    /// Wall-clock duration; equals `completed_at - started_at` when both
    /// are present.
    pub duration_ms: Option<i64>,
    /// Executor-reported extras.
    pub usage: Option<UsageInfo>,
    /// When the execution row was created.
    pub created_at: DateTime<Utc>,
    /// When the executor started.
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal status was reached.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Create a new pending execution for a task.
    pub fn new(task_id: Uuid, trigger_type: TriggerType, trigger_context: EventContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            trigger_type,
            trigger_context,
            status: ExecutionStatus::Pending,
            output: String::new(),
            thinking: String::new(),
            error: None,
            exit_code: None,
            duration_ms: None,
            usage: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Create a terminal `skipped` execution for audit. `reason` lands in
    /// the trigger context under `skip_reason`.
    pub fn skipped(
        task_id: Uuid,
        trigger_type: TriggerType,
        mut trigger_context: EventContext,
        reason: &str,
    ) -> Self {
        trigger_context.insert("skip_reason".into(), serde_json::Value::String(reason.into()));
        let mut execution = Self::new(task_id, trigger_type, trigger_context);
        execution.status = ExecutionStatus::Skipped;
        execution.completed_at = Some(Utc::now());
        execution
    }

    /// Transition to `running` and stamp `started_at`.
    pub fn start(&mut self) -> Result<(), String> {
        self.transition_to(ExecutionStatus::Running)
    }

    /// Apply an executor result and transition to its terminal status.
    /// `duration_ms` is derived from the timestamps so it always equals
    /// `completed_at - started_at`; the executor's own measurement is only
    /// a fallback when `started_at` is missing.
    pub fn finish(&mut self, result: ExecutionResult) -> Result<(), String> {
        self.transition_to(result.status.into())?;
        self.output = result.output;
        self.error = result.error;
        self.exit_code = result.exit_code;
        self.usage = result.usage;
        if self.duration_ms.is_none() {
            self.duration_ms = Some(result.duration_ms);
        }
        Ok(())
    }

    /// Transition to a new status, enforcing the state machine and stamping
    /// timestamps. Terminal statuses set `completed_at`; `duration_ms` is
    /// derived from `started_at` when not already set by the executor.
    pub fn transition_to(&mut self, new_status: ExecutionStatus) -> Result<(), String> {
        if !self.status.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition execution from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        match new_status {
            ExecutionStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => {
                let now = Utc::now();
                self.completed_at = Some(now);
                if self.duration_ms.is_none() {
                    if let Some(started) = self.started_at {
                        self.duration_ms = Some((now - started).num_milliseconds());
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Retry attempt number carried by this execution's trigger context
    /// (0 for a first attempt).
    pub fn retry_count(&self) -> u32 {
        super::event::context_u32(&self.trigger_context, "retry_count").unwrap_or(0)
    }
}
