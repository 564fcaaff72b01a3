//! Shared helpers for integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use taskforge::adapters::executors::ShellExecutor;
use taskforge::adapters::sqlite;
use taskforge::domain::models::{Config, Task, TaskConfig, Trigger};
use taskforge::domain::ports::{ExecutionFilter, Storage};
use taskforge::services::{ExecutorRegistry, Runtime};

/// Runtime over in-memory SQLite with the shell executor registered.
pub async fn test_runtime() -> Runtime {
    let storage = sqlite::open_in_memory().await.expect("in-memory storage");
    let config = Config::default();
    let registry =
        ExecutorRegistry::new().register(Arc::new(ShellExecutor::new(storage.clone())));
    Runtime::new(config, storage, registry)
}

pub fn shell_task(name: &str, command: &str) -> Task {
    Task::new(
        name,
        TaskConfig::Shell {
            command: command.into(),
            workdir: None,
            env: HashMap::new(),
        },
        Trigger::Manual,
    )
}

/// All executions of a task, oldest first.
pub async fn executions_for(
    storage: &Arc<dyn Storage>,
    task_id: uuid::Uuid,
) -> Vec<taskforge::domain::models::Execution> {
    let mut executions = storage
        .load_executions(ExecutionFilter {
            task_id: Some(task_id),
            ..Default::default()
        })
        .await
        .expect("load executions");
    executions.sort_by_key(|e| e.created_at);
    executions
}
