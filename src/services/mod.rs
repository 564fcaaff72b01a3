//! Orchestration services.

pub mod cron;
pub mod hook_router;
pub mod outcome;
pub mod pattern;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod template;
pub mod tracker;

pub use cron::CronTimer;
pub use hook_router::HookRouter;
pub use outcome::{format_execution, OutcomePipeline};
pub use registry::ExecutorRegistry;
pub use runtime::Runtime;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use tracker::ActivityTracker;
