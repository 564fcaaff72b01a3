//! Storage contract behavior over the SQLite adapter.

mod common;

use std::collections::HashMap;

use taskforge::adapters::sqlite;
use taskforge::domain::models::{
    Backoff, EventContext, Execution, ExecutionResult, ExecutionStatus, FileConfig, FileFormat,
    Handler, HookEventType, RetryConfig, RetryOn, TaskConfig, TaskOptions, Trigger, TriggerType,
};
use taskforge::domain::ports::{ExecutionFilter, TaskFilter};

use common::shell_task;

#[tokio::test]
async fn test_task_round_trip() {
    let storage = sqlite::open_in_memory().await.unwrap();

    let mut task = shell_task("round-trip", "echo hi");
    task.trigger = Trigger::Event {
        event: HookEventType::FileSaved,
        filters: HashMap::from([("file_path".to_string(), vec!["**/*.rs".to_string()])]),
    };
    task.options = TaskOptions {
        timeout_ms: Some(5_000),
        max_concurrent: Some(2),
        queue: true,
        queue_limit: Some(4),
        priority: 3,
    };
    task.handlers = vec![
        Handler::Retry(RetryConfig {
            max_attempts: 5,
            backoff: Backoff::Linear,
            initial_delay_ms: 50,
            max_delay_ms: 500,
            on: RetryOn::Any,
        }),
        Handler::File(FileConfig {
            path: "/tmp/{{task.name}}.md".into(),
            append: true,
            format: FileFormat::Markdown,
        }),
    ];

    storage.create_task(&task).await.unwrap();
    let loaded = storage.get_task(task.id).await.unwrap().unwrap();

    assert_eq!(loaded.id, task.id);
    assert_eq!(loaded.name, task.name);
    assert_eq!(loaded.config, task.config);
    assert_eq!(loaded.trigger, task.trigger);
    assert_eq!(loaded.options, task.options);
    assert_eq!(loaded.handlers, task.handlers);
    assert_eq!(loaded.run_count, 0);
}

#[tokio::test]
async fn test_get_missing_task_is_none() {
    let storage = sqlite::open_in_memory().await.unwrap();
    assert!(storage.get_task(uuid::Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_and_delete_task() {
    let storage = sqlite::open_in_memory().await.unwrap();
    let mut task = shell_task("mutable", "true");
    storage.create_task(&task).await.unwrap();

    task.enabled = false;
    task.name = "renamed".into();
    storage.update_task(&task).await.unwrap();

    let loaded = storage.get_task(task.id).await.unwrap().unwrap();
    assert!(!loaded.enabled);
    assert_eq!(loaded.name, "renamed");

    storage.delete_task(task.id).await.unwrap();
    assert!(storage.get_task(task.id).await.unwrap().is_none());
    // Deleting again fails loudly.
    assert!(storage.delete_task(task.id).await.is_err());
}

#[tokio::test]
async fn test_delete_task_cascades_executions() {
    let storage = sqlite::open_in_memory().await.unwrap();
    let task = shell_task("cascade", "true");
    storage.create_task(&task).await.unwrap();

    let execution = Execution::new(task.id, TriggerType::Manual, EventContext::new());
    storage.create_execution(&execution).await.unwrap();

    storage.delete_task(task.id).await.unwrap();
    assert!(storage
        .get_execution(execution.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_load_tasks_filters() {
    let storage = sqlite::open_in_memory().await.unwrap();

    let shell = shell_task("shell-manual", "true");
    let disabled = shell_task("disabled", "true").with_enabled(false);
    let mut cron = shell_task("cron-task", "true");
    cron.trigger = Trigger::Cron {
        schedule: "*/5 * * * *".into(),
    };
    let mut event = shell_task("event-task", "true");
    event.trigger = Trigger::Event {
        event: HookEventType::ToolPost,
        filters: HashMap::new(),
    };

    for task in [&shell, &disabled, &cron, &event] {
        storage.create_task(task).await.unwrap();
    }

    let enabled = storage
        .load_tasks(TaskFilter {
            enabled: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(enabled.len(), 3);

    let cron_tasks = storage.load_tasks(TaskFilter::cron_tasks()).await.unwrap();
    assert_eq!(cron_tasks.len(), 1);
    assert_eq!(cron_tasks[0].id, cron.id);

    let subscribers = storage
        .load_tasks(TaskFilter::subscribers(HookEventType::ToolPost))
        .await
        .unwrap();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].id, event.id);

    assert!(storage
        .load_tasks(TaskFilter::subscribers(HookEventType::SessionEnd))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_execution_round_trip_with_context() {
    let storage = sqlite::open_in_memory().await.unwrap();
    let task = shell_task("exec-owner", "true");
    storage.create_task(&task).await.unwrap();

    let mut context = EventContext::new();
    context.insert("retry_count".into(), serde_json::json!(2));
    context.insert("previous_error".into(), serde_json::json!("boom"));

    let mut execution = Execution::new(task.id, TriggerType::Retry, context);
    storage.create_execution(&execution).await.unwrap();

    execution.start().unwrap();
    execution
        .finish(ExecutionResult::success("done\n", 17))
        .unwrap();
    storage.update_execution(&execution).await.unwrap();

    let loaded = storage.get_execution(execution.id).await.unwrap().unwrap();
    assert_eq!(loaded.trigger_type, TriggerType::Retry);
    assert_eq!(loaded.retry_count(), 2);
    assert_eq!(loaded.status, ExecutionStatus::Success);
    assert_eq!(loaded.output, "done\n");
    assert_eq!(loaded.duration_ms, execution.duration_ms);
    assert!(loaded.started_at.is_some());
    assert!(loaded.completed_at.is_some());
}

#[tokio::test]
async fn test_finalize_bumps_counters_atomically() {
    let storage = sqlite::open_in_memory().await.unwrap();
    let task = shell_task("counted", "true");
    storage.create_task(&task).await.unwrap();

    for result in [
        ExecutionResult::success("", 1),
        ExecutionResult::failure("nope", 1),
    ] {
        let mut execution = Execution::new(task.id, TriggerType::Manual, EventContext::new());
        storage.create_execution(&execution).await.unwrap();
        execution.start().unwrap();
        execution.finish(result).unwrap();
        storage.finalize_execution(&execution).await.unwrap();
    }

    // A skipped execution bumps nothing.
    let skipped = Execution::skipped(task.id, TriggerType::Cron, EventContext::new(), "capacity");
    storage.create_execution(&skipped).await.unwrap();

    let loaded = storage.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.run_count, 2);
    assert_eq!(loaded.success_count, 1);
    assert_eq!(loaded.failure_count, 1);
}

#[tokio::test]
async fn test_load_executions_filters_and_pagination() {
    let storage = sqlite::open_in_memory().await.unwrap();
    let task = shell_task("history", "true");
    storage.create_task(&task).await.unwrap();

    for i in 0..5 {
        let mut execution = Execution::new(task.id, TriggerType::Manual, EventContext::new());
        storage.create_execution(&execution).await.unwrap();
        execution.start().unwrap();
        let result = if i % 2 == 0 {
            ExecutionResult::success("", 1)
        } else {
            ExecutionResult::failure("x", 1)
        };
        execution.finish(result).unwrap();
        storage.update_execution(&execution).await.unwrap();
    }

    let all = storage
        .load_executions(ExecutionFilter {
            task_id: Some(task.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 5);

    let failures = storage
        .load_executions(ExecutionFilter {
            task_id: Some(task.id),
            status: Some(ExecutionStatus::Failure),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failures.len(), 2);

    let page = storage
        .load_executions(ExecutionFilter {
            task_id: Some(task.id),
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
}

#[tokio::test]
async fn test_streaming_append_and_progress() {
    let storage = sqlite::open_in_memory().await.unwrap();
    let task = shell_task("streamer", "true");
    storage.create_task(&task).await.unwrap();

    let mut execution = Execution::new(task.id, TriggerType::Manual, EventContext::new());
    storage.create_execution(&execution).await.unwrap();
    execution.start().unwrap();
    storage.update_execution(&execution).await.unwrap();

    storage
        .append_execution_output(execution.id, "chunk one\n")
        .await
        .unwrap();
    storage
        .append_execution_output(execution.id, "chunk two\n")
        .await
        .unwrap();
    storage
        .append_execution_thinking(execution.id, "pondering\n")
        .await
        .unwrap();

    let progress = storage
        .get_execution_progress(execution.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.output, "chunk one\nchunk two\n");
    assert_eq!(progress.thinking, "pondering\n");
    assert_eq!(progress.status, ExecutionStatus::Running);

    assert!(storage
        .get_execution_progress(uuid::Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_task_stats() {
    let storage = sqlite::open_in_memory().await.unwrap();
    let task = shell_task("stats", "true");
    storage.create_task(&task).await.unwrap();

    let outcomes = [
        (ExecutionStatus::Success, 100, Some(0.01)),
        (ExecutionStatus::Success, 200, Some(0.02)),
        (ExecutionStatus::Failure, 300, None),
        (ExecutionStatus::Timeout, 400, None),
    ];
    for (status, duration, cost) in outcomes {
        let mut execution = Execution::new(task.id, TriggerType::Manual, EventContext::new());
        storage.create_execution(&execution).await.unwrap();
        execution.start().unwrap();
        let mut result = match status {
            ExecutionStatus::Success => ExecutionResult::success("", duration),
            _ => {
                let mut r = ExecutionResult::failure("x", duration);
                if status == ExecutionStatus::Timeout {
                    r.status = taskforge::domain::models::ResultStatus::Timeout;
                }
                r
            }
        };
        result.usage = cost.map(|cost_usd| taskforge::domain::models::UsageInfo {
            cost_usd: Some(cost_usd),
            ..Default::default()
        });
        execution.finish(result).unwrap();
        // Pin the duration so the average is deterministic.
        execution.duration_ms = Some(duration);
        storage.finalize_execution(&execution).await.unwrap();
    }

    let stats = storage.get_task_stats(task.id).await.unwrap();
    assert_eq!(stats.total_runs, 4);
    assert_eq!(stats.successful_runs, 2);
    assert_eq!(stats.failed_runs, 2);
    let avg = stats.average_duration_ms.unwrap();
    assert!((avg - 250.0).abs() < 1e-6, "avg was {avg}");
    let cost = stats.total_cost_usd.unwrap();
    assert!((cost - 0.03).abs() < 1e-9, "cost was {cost}");
}

#[tokio::test]
async fn test_sweep_stale_executions() {
    let storage = sqlite::open_in_memory().await.unwrap();
    let task = shell_task("stale", "true");
    storage.create_task(&task).await.unwrap();

    let pending = Execution::new(task.id, TriggerType::Manual, EventContext::new());
    storage.create_execution(&pending).await.unwrap();

    let mut running = Execution::new(task.id, TriggerType::Cron, EventContext::new());
    storage.create_execution(&running).await.unwrap();
    running.start().unwrap();
    storage.update_execution(&running).await.unwrap();

    let mut done = Execution::new(task.id, TriggerType::Manual, EventContext::new());
    storage.create_execution(&done).await.unwrap();
    done.start().unwrap();
    done.finish(ExecutionResult::success("", 1)).unwrap();
    storage.update_execution(&done).await.unwrap();

    let swept = storage.sweep_stale_executions("recovered").await.unwrap();
    assert_eq!(swept, 2);

    for id in [pending.id, running.id] {
        let loaded = storage.get_execution(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Failure);
        assert_eq!(loaded.error.as_deref(), Some("recovered"));
        assert!(loaded.completed_at.is_some());
    }
    // The running one has a derived duration.
    let recovered_running = storage.get_execution(running.id).await.unwrap().unwrap();
    assert!(recovered_running.duration_ms.is_some());

    // Terminal executions are untouched.
    let untouched = storage.get_execution(done.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, ExecutionStatus::Success);
}
