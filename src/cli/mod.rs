//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "taskforge",
    version,
    about = "Task orchestration service: cron-like scheduling, event hooks, outcome handlers"
)]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from a specific file instead of the
    /// .taskforge/ hierarchy
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// List execution history
    Runs {
        /// Only executions of this task
        #[arg(long)]
        task: Option<Uuid>,
        /// Filter by status (pending, running, success, failure, timeout,
        /// cancelled, skipped)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show aggregate statistics for a task
    Stats { task_id: Uuid },

    /// Run the scheduler daemon (cron timer, recovery sweep)
    Serve,

    /// Deliver a hook event. Context JSON comes from the argument or stdin.
    HookEvent {
        /// file_saved, session_start, session_end, tool_pre, tool_post,
        /// cron_tick, manual
        event_type: String,
        /// JSON object with context fields; read from stdin when omitted
        context: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task
    Add {
        /// Task name
        #[arg(long)]
        name: String,
        /// Shell command (creates a shell task)
        #[arg(long, conflicts_with = "prompt")]
        command: Option<String>,
        /// Agent prompt (creates an agent task)
        #[arg(long)]
        prompt: Option<String>,
        /// Model override for agent tasks
        #[arg(long, requires = "prompt")]
        model: Option<String>,
        /// Cron schedule (5-field or 6-field with seconds)
        #[arg(long, conflicts_with = "on_event")]
        cron: Option<String>,
        /// Subscribe to a hook event
        #[arg(long)]
        on_event: Option<String>,
        /// Context filter, `field=pattern`, repeatable. Patterns within
        /// the same field OR together; distinct fields must all match.
        #[arg(long = "pattern", requires = "on_event")]
        patterns: Vec<String>,
        /// Executor deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Max simultaneous executions (default 1)
        #[arg(long)]
        max_concurrent: Option<u32>,
        /// Park over-capacity dispatches instead of skipping them
        #[arg(long)]
        queue: bool,
        /// Dispatch priority (higher first)
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Outcome handlers as a JSON array
        #[arg(long)]
        handlers: Option<String>,
        /// Create the task disabled
        #[arg(long)]
        disabled: bool,
    },
    /// List tasks
    List {
        /// Only enabled or disabled tasks
        #[arg(long)]
        enabled: Option<bool>,
    },
    /// Show one task
    Show { task_id: Uuid },
    /// Enable a task
    Enable { task_id: Uuid },
    /// Disable a task
    Disable { task_id: Uuid },
    /// Delete a task and its executions
    Remove { task_id: Uuid },
    /// Trigger a task manually and wait for the result
    Run { task_id: Uuid },
}
