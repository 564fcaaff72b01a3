//! taskforge - task orchestration service
//!
//! A cron-like scheduler that executes user-defined tasks (shell commands,
//! AI-agent prompts) on time-based, event-based, or manual triggers,
//! records every execution, and reacts to outcomes through configurable
//! handlers (retries, file output, chained triggers).

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Config, Execution, Task};
pub use services::Runtime;
