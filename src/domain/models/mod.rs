//! Domain models.

pub mod config;
pub mod event;
pub mod execution;
pub mod handler;
pub mod task;

pub use config::{AgentConfig, Config, LoggingConfig, SchedulerConfig, StorageConfig};
pub use event::{context_str, context_u32, EventContext, HookEventType};
pub use execution::{
    Execution, ExecutionResult, ExecutionStatus, ResultStatus, TriggerType, UsageInfo,
};
pub use handler::{Backoff, FileConfig, FileFormat, Handler, RetryConfig, RetryOn};
pub use task::{parse_cron_schedule, Task, TaskConfig, TaskKind, TaskOptions, Trigger};
