//! Shell command executor.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Execution, ExecutionResult, ResultStatus, Task, TaskConfig, TaskKind,
};
use crate::domain::ports::{Executor, Storage};

use super::terminate_child;

pub struct ShellExecutor {
    storage: Arc<dyn Storage>,
}

impl ShellExecutor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Shell
    }

    async fn execute(
        &self,
        task: &Task,
        execution: &Execution,
        cancel: CancellationToken,
    ) -> DomainResult<ExecutionResult> {
        let TaskConfig::Shell {
            command,
            workdir,
            env,
        } = &task.config
        else {
            return Err(DomainError::ValidationFailed(
                "shell executor received a non-shell task".to_string(),
            ));
        };

        let started = Instant::now();
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| DomainError::ExecutionFailed(format!("spawn failed: {e}")))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DomainError::ExecutionFailed("failed to capture stdout".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            DomainError::ExecutionFailed("failed to capture stderr".to_string())
        })?;

        let stdout_task = {
            let storage = self.storage.clone();
            let execution_id = execution.id;
            tokio::spawn(async move { read_stream(stdout, Some((storage, execution_id))).await })
        };
        let stderr_task = tokio::spawn(async move { read_stream(stderr, None).await });

        let (status, was_cancelled) = tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| DomainError::ExecutionFailed(format!("wait failed: {e}")))?;
                (Some(status), false)
            }
            () = cancel.cancelled() => {
                (terminate_child(&mut child).await, true)
            }
        };

        let output = stdout_task.await.unwrap_or_default();
        let stderr_text = stderr_task.await.unwrap_or_default();
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let exit_code = status.and_then(|s| s.code());

        let (result_status, error) = if was_cancelled {
            (ResultStatus::Cancelled, Some("command cancelled".to_string()))
        } else {
            match exit_code {
                Some(0) => (ResultStatus::Success, None),
                Some(code) => {
                    let mut message = format!("command exited with code {code}");
                    let stderr_trim = stderr_text.trim();
                    if !stderr_trim.is_empty() {
                        message.push_str(": ");
                        message.push_str(stderr_trim);
                    }
                    (ResultStatus::Failure, Some(message))
                }
                // Killed by a signal outside our cancel path.
                None => (
                    ResultStatus::Failure,
                    Some("command terminated by signal".to_string()),
                ),
            }
        };

        Ok(ExecutionResult {
            status: result_status,
            output,
            error,
            exit_code,
            duration_ms,
            usage: None,
        })
    }
}

/// Read a stream line by line, optionally mirroring each line into the
/// execution's streamed output.
async fn read_stream(
    stream: impl tokio::io::AsyncRead + Unpin,
    mirror: Option<(Arc<dyn Storage>, Uuid)>,
) -> String {
    let mut lines = BufReader::new(stream).lines();
    let mut collected = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        collected.push_str(&line);
        collected.push('\n');
        if let Some((storage, execution_id)) = &mirror {
            let chunk = format!("{line}\n");
            if let Err(e) = storage.append_execution_output(*execution_id, &chunk).await {
                tracing::debug!(%execution_id, error = %e, "Output streaming write failed");
            }
        }
    }
    collected
}
