//! Outcome pipeline.
//!
//! Consumes terminal executions from the scheduler and walks the owning
//! task's handlers in declared order: retry scheduling, file output,
//! chained triggers. A handler failure is logged and never aborts the
//! remaining handlers or changes the execution.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EventContext, Execution, ExecutionStatus, FileConfig, FileFormat, Handler, RetryConfig,
    RetryOn, Task, TriggerType,
};
use crate::domain::ports::Dispatcher;
use crate::services::template;
use crate::services::tracker::{ActivityGuard, ActivityTracker};

/// A terminal execution handed from the scheduler to the pipeline. The
/// guard keeps drain() honest while the item is in the channel or being
/// processed.
pub struct OutcomeItem {
    pub task: Task,
    pub execution: Execution,
    pub(crate) _guard: ActivityGuard,
}

pub struct OutcomePipeline {
    dispatcher: Arc<dyn Dispatcher>,
    tracker: ActivityTracker,
}

impl OutcomePipeline {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, tracker: ActivityTracker) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            tracker,
        })
    }

    /// Consume outcome items until the scheduler side closes the channel.
    /// Items are processed on their own tasks so one slow handler chain
    /// does not delay other executions; handlers within one execution stay
    /// strictly ordered.
    pub fn start(self: Arc<Self>, mut rx: mpsc::Receiver<OutcomeItem>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let pipeline = self.clone();
                tokio::spawn(async move {
                    pipeline.process(item).await;
                });
            }
        })
    }

    pub async fn process(&self, item: OutcomeItem) {
        let OutcomeItem {
            task,
            execution,
            _guard,
        } = item;

        if !execution.status.ran() {
            // Skipped executions are audit records, not outcomes.
            return;
        }

        for (index, handler) in task.handlers.iter().enumerate() {
            let outcome = match handler {
                Handler::Retry(config) => self.run_retry(&task, &execution, config).await,
                Handler::File(config) => self.run_file(&task, &execution, config).await,
                Handler::Trigger { task_id } => self.run_trigger(&task, &execution, *task_id).await,
            };
            if let Err(e) = outcome {
                tracing::warn!(
                    task = %task.name,
                    execution_id = %execution.id,
                    handler_index = index,
                    error = %e,
                    "Outcome handler failed"
                );
            }
        }
    }

    /// Schedule a retry when the outcome matches the handler's `on` filter
    /// and the attempt budget allows another try.
    async fn run_retry(
        &self,
        task: &Task,
        execution: &Execution,
        config: &RetryConfig,
    ) -> DomainResult<()> {
        let eligible = match execution.status {
            ExecutionStatus::Failure => matches!(config.on, RetryOn::Failure | RetryOn::Any),
            ExecutionStatus::Timeout => matches!(config.on, RetryOn::Timeout | RetryOn::Any),
            _ => false,
        };
        if !eligible {
            return Ok(());
        }

        let attempt = execution.retry_count() + 1;
        if attempt >= config.max_attempts {
            tracing::info!(
                task = %task.name,
                execution_id = %execution.id,
                attempt,
                max_attempts = config.max_attempts,
                "Retry budget exhausted"
            );
            return Ok(());
        }

        let delay_ms = config.delay_ms(attempt);
        let mut context = EventContext::new();
        context.insert("retry_count".into(), json!(attempt));
        context.insert(
            "previous_execution_id".into(),
            json!(execution.id.to_string()),
        );
        if let Some(error) = &execution.error {
            context.insert("previous_error".into(), json!(error));
        }
        if let Some(code) = execution.exit_code {
            context.insert("previous_exit_code".into(), json!(code));
        }
        context.insert("retry_delay_ms".into(), json!(delay_ms));
        context.insert(
            "retry_scheduled_at".into(),
            json!(Utc::now().to_rfc3339()),
        );

        tracing::info!(
            task = %task.name,
            attempt,
            delay_ms,
            "Scheduling retry"
        );

        let dispatcher = self.dispatcher.clone();
        let task_id = task.id;
        let guard = self.tracker.begin();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            if let Err(e) = dispatcher
                .dispatch(task_id, TriggerType::Retry, context)
                .await
            {
                tracing::warn!(%task_id, error = %e, "Retry dispatch failed");
            }
            drop(guard);
        });
        Ok(())
    }

    /// Write the execution to a file at a templated path.
    async fn run_file(
        &self,
        task: &Task,
        execution: &Execution,
        config: &FileConfig,
    ) -> DomainResult<()> {
        let path = template::resolve(&config.path, task, execution);
        if let Some(parent) = Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DomainError::ExecutionFailed(format!(
                        "create {}: {}",
                        parent.display(),
                        e
                    )))?;
            }
        }

        let content = format_execution(task, execution, config.format);
        if config.append {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| DomainError::ExecutionFailed(format!("open {}: {}", path, e)))?;
            file.write_all(content.as_bytes())
                .await
                .map_err(|e| DomainError::ExecutionFailed(format!("write {}: {}", path, e)))?;
            if !content.ends_with('\n') {
                file.write_all(b"\n")
                    .await
                    .map_err(|e| DomainError::ExecutionFailed(format!("write {}: {}", path, e)))?;
            }
        } else {
            tokio::fs::write(&path, content.as_bytes())
                .await
                .map_err(|e| DomainError::ExecutionFailed(format!("write {}: {}", path, e)))?;
        }
        tracing::debug!(task = %task.name, path, "Wrote execution output file");
        Ok(())
    }

    /// Fire a downstream task with a summary of this execution. Subject to
    /// normal scheduling rules at dispatch.
    async fn run_trigger(
        &self,
        task: &Task,
        execution: &Execution,
        target: Uuid,
    ) -> DomainResult<()> {
        if target == task.id {
            return Err(DomainError::ValidationFailed(
                "trigger handler cannot chain a task to itself".to_string(),
            ));
        }
        let mut context = EventContext::new();
        context.insert("parent_task_id".into(), json!(task.id.to_string()));
        context.insert("parent_task_name".into(), json!(task.name));
        context.insert(
            "parent_execution_id".into(),
            json!(execution.id.to_string()),
        );
        context.insert(
            "parent_status".into(),
            json!(execution.status.as_str()),
        );
        if let Some(code) = execution.exit_code {
            context.insert("parent_exit_code".into(), json!(code));
        }
        if let Some(error) = &execution.error {
            context.insert("parent_error".into(), json!(error));
        }
        if let Some(duration) = execution.duration_ms {
            context.insert("parent_duration_ms".into(), json!(duration));
        }

        self.dispatcher
            .dispatch(target, TriggerType::Chain, context)
            .await?;
        Ok(())
    }
}

/// Render an execution in the given file format. Pure over the task and
/// execution: formatting the same pair twice yields identical bytes.
pub fn format_execution(task: &Task, execution: &Execution, format: FileFormat) -> String {
    match format {
        FileFormat::Text => execution.output.clone(),
        FileFormat::Json => format_json(task, execution),
        FileFormat::Markdown => format_markdown(task, execution),
    }
}

fn format_json(task: &Task, execution: &Execution) -> String {
    let mut doc = json!({
        "task": {
            "id": task.id.to_string(),
            "name": task.name,
            "type": task.kind().as_str(),
        },
        "execution": {
            "id": execution.id.to_string(),
            "status": execution.status.as_str(),
            "trigger_type": execution.trigger_type.as_str(),
            "started_at": execution.started_at.map(|t| t.to_rfc3339()),
            "completed_at": execution.completed_at.map(|t| t.to_rfc3339()),
            "duration_ms": execution.duration_ms,
            "exit_code": execution.exit_code,
            "output": execution.output,
            "error": execution.error,
        },
    });
    if let Some(usage) = &execution.usage {
        if !usage.is_empty() {
            doc["usage"] = serde_json::to_value(usage).unwrap_or(Value::Null);
        }
    }
    // to_string_pretty on a fixed-shape document is deterministic.
    serde_json::to_string_pretty(&doc).unwrap_or_default()
}

fn format_markdown(task: &Task, execution: &Execution) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "# {}", task.name);
    let _ = writeln!(out);
    let _ = writeln!(out, "- **Task**: `{}` ({})", task.id, task.kind().as_str());
    let _ = writeln!(out, "- **Execution**: `{}`", execution.id);
    let _ = writeln!(out, "- **Status**: {}", execution.status.as_str());
    let _ = writeln!(out, "- **Trigger**: {}", execution.trigger_type.as_str());
    let _ = writeln!(
        out,
        "- **Started**: {}",
        execution
            .started_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );
    let _ = writeln!(
        out,
        "- **Completed**: {}",
        execution
            .completed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(duration) = execution.duration_ms {
        let _ = writeln!(out, "- **Duration**: {} ms", duration);
    }
    if let Some(code) = execution.exit_code {
        let _ = writeln!(out, "- **Exit code**: {}", code);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "## Output");
    let _ = writeln!(out);
    let _ = writeln!(out, "```");
    let _ = writeln!(out, "{}", execution.output.trim_end_matches('\n'));
    let _ = writeln!(out, "```");

    if let Some(error) = &execution.error {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Error");
        let _ = writeln!(out);
        let _ = writeln!(out, "```");
        let _ = writeln!(out, "{}", error.trim_end_matches('\n'));
        let _ = writeln!(out, "```");
    }

    if let Some(usage) = &execution.usage {
        if !usage.tool_calls.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Tool Calls");
            let _ = writeln!(out);
            for call in &usage.tool_calls {
                let _ = writeln!(out, "- {}", call);
            }
        }
        if usage.input_tokens.is_some() || usage.output_tokens.is_some() || usage.cost_usd.is_some()
        {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Usage");
            let _ = writeln!(out);
            if let Some(tokens) = usage.input_tokens {
                let _ = writeln!(out, "- Input tokens: {}", tokens);
            }
            if let Some(tokens) = usage.output_tokens {
                let _ = writeln!(out, "- Output tokens: {}", tokens);
            }
            if let Some(cost) = usage.cost_usd {
                let _ = writeln!(out, "- Cost: ${:.4}", cost);
            }
        }
    }

    out
}
