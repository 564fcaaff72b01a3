//! Task admin and manual-run command handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use uuid::Uuid;

use crate::cli::output;
use crate::domain::models::{
    EventContext, ExecutionStatus, Handler, HookEventType, Task, TaskConfig, TaskOptions, Trigger,
    TriggerType,
};
use crate::domain::ports::{Storage, TaskFilter};
use crate::services::Runtime;

#[allow(clippy::too_many_arguments)]
pub async fn handle_add(
    storage: &Arc<dyn Storage>,
    name: String,
    command: Option<String>,
    prompt: Option<String>,
    model: Option<String>,
    cron: Option<String>,
    on_event: Option<String>,
    patterns: Vec<String>,
    timeout_ms: Option<u64>,
    max_concurrent: Option<u32>,
    queue: bool,
    priority: i32,
    handlers: Option<String>,
    disabled: bool,
    json: bool,
) -> Result<()> {
    let config = match (command, prompt) {
        (Some(command), None) => TaskConfig::Shell {
            command,
            workdir: None,
            env: HashMap::new(),
        },
        (None, Some(prompt)) => TaskConfig::Agent {
            prompt,
            model,
            max_turns: None,
        },
        _ => bail!("exactly one of --command or --prompt is required"),
    };

    let trigger = match (cron, on_event) {
        (Some(schedule), None) => Trigger::Cron { schedule },
        (None, Some(event)) => {
            let event = HookEventType::from_str(&event)
                .ok_or_else(|| anyhow!("unknown event type '{event}'"))?;
            Trigger::Event {
                event,
                filters: parse_patterns(&patterns)?,
            }
        }
        (None, None) => Trigger::Manual,
        _ => unreachable!("clap conflicts_with prevents cron + on_event"),
    };

    let handlers: Vec<Handler> = match handlers {
        Some(raw) => serde_json::from_str(&raw).context("invalid --handlers JSON")?,
        None => Vec::new(),
    };

    let mut task = Task::new(name, config, trigger)
        .with_options(TaskOptions {
            timeout_ms,
            max_concurrent,
            queue,
            queue_limit: None,
            priority,
        })
        .with_enabled(!disabled);
    task.handlers = handlers;

    task.validate().map_err(|e| anyhow!(e))?;
    storage.create_task(&task).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        println!("Created task {} ({})", task.name, task.id);
    }
    Ok(())
}

pub async fn handle_list(
    storage: &Arc<dyn Storage>,
    enabled: Option<bool>,
    json: bool,
) -> Result<()> {
    let tasks = storage
        .load_tasks(TaskFilter {
            enabled,
            ..Default::default()
        })
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else if tasks.is_empty() {
        println!("No tasks.");
    } else {
        println!("{}", output::task_table(&tasks));
    }
    Ok(())
}

pub async fn handle_show(storage: &Arc<dyn Storage>, task_id: Uuid, json: bool) -> Result<()> {
    let task = storage
        .get_task(task_id)
        .await?
        .ok_or_else(|| anyhow!("task {task_id} not found"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        println!("{}", output::task_table(std::slice::from_ref(&task)));
        if !task.handlers.is_empty() {
            println!("Handlers: {}", serde_json::to_string(&task.handlers)?);
        }
    }
    Ok(())
}

pub async fn handle_set_enabled(
    storage: &Arc<dyn Storage>,
    task_id: Uuid,
    enabled: bool,
    json: bool,
) -> Result<()> {
    let mut task = storage
        .get_task(task_id)
        .await?
        .ok_or_else(|| anyhow!("task {task_id} not found"))?;
    task.enabled = enabled;
    storage.update_task(&task).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        println!(
            "Task {} is now {}",
            task.name,
            if enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

pub async fn handle_remove(storage: &Arc<dyn Storage>, task_id: Uuid, json: bool) -> Result<()> {
    storage.delete_task(task_id).await?;
    if json {
        println!("{}", serde_json::json!({ "deleted": task_id.to_string() }));
    } else {
        println!("Deleted task {task_id}");
    }
    Ok(())
}

/// Trigger a task manually, wait for its terminal state, and print the
/// result. Outcome handlers are drained before exit so file writes and
/// short retry chains complete.
pub async fn handle_run(runtime: &Runtime, task_id: Uuid, json: bool) -> Result<()> {
    let execution_id = runtime
        .scheduler
        .execute_task(task_id, TriggerType::Manual, EventContext::new())
        .await?
        .ok_or_else(|| anyhow!("task {task_id} not found or disabled"))?;

    let execution = wait_for_terminal(runtime, execution_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        println!(
            "Execution {} finished: {}",
            execution.id,
            execution.status.as_str()
        );
        if !execution.output.is_empty() {
            print!("{}", execution.output);
        }
        if let Some(error) = &execution.error {
            eprintln!("error: {error}");
        }
    }

    if !runtime.drain(Duration::from_secs(600)).await {
        tracing::warn!("Exiting with outcome work still pending");
    }

    if execution.status == ExecutionStatus::Success {
        Ok(())
    } else {
        Err(anyhow!("execution {}", execution.status.as_str()))
    }
}

async fn wait_for_terminal(
    runtime: &Runtime,
    execution_id: Uuid,
) -> Result<crate::domain::models::Execution> {
    loop {
        if let Some(execution) = runtime.storage.get_execution(execution_id).await? {
            if execution.is_terminal() {
                return Ok(execution);
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Parse repeated `field=pattern` flags into pattern families.
fn parse_patterns(raw: &[String]) -> Result<HashMap<String, Vec<String>>> {
    let mut families: HashMap<String, Vec<String>> = HashMap::new();
    for entry in raw {
        let (field, pattern) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("pattern '{entry}' must be field=pattern"))?;
        if field.is_empty() || pattern.is_empty() {
            bail!("pattern '{entry}' must be field=pattern");
        }
        families
            .entry(field.to_string())
            .or_default()
            .push(pattern.to_string());
    }
    Ok(families)
}
