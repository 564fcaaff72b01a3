//! End-to-end scheduler behavior over the shell executor.

mod common;

use std::time::{Duration, Instant};

use taskforge::domain::models::{
    EventContext, ExecutionStatus, TaskOptions, TriggerType,
};

use common::{executions_for, shell_task, test_runtime};

#[tokio::test]
async fn test_shell_success() {
    let runtime = test_runtime().await;
    let task = shell_task("hello", r#"echo "Hello, World!""#);
    runtime.storage.create_task(&task).await.unwrap();

    let execution_id = runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .expect("execution created");

    assert!(runtime.drain(Duration::from_secs(10)).await);

    let execution = runtime
        .storage
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(execution.output.contains("Hello, World!"));
    assert_eq!(execution.exit_code, Some(0));
    assert!(execution.duration_ms.unwrap() >= 0);
    assert!(execution.completed_at.is_some());

    let task = runtime.storage.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.run_count, 1);
    assert_eq!(task.success_count, 1);
    assert_eq!(task.failure_count, 0);
}

#[tokio::test]
async fn test_shell_failure_exit_code() {
    let runtime = test_runtime().await;
    let task = shell_task("fail", "exit 42");
    runtime.storage.create_task(&task).await.unwrap();

    let execution_id = runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();

    assert!(runtime.drain(Duration::from_secs(10)).await);

    let execution = runtime
        .storage
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failure);
    assert_eq!(execution.exit_code, Some(42));
    assert!(execution.error.as_deref().unwrap().contains("42"));

    let task = runtime.storage.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.run_count, 1);
    assert_eq!(task.failure_count, 1);
}

#[tokio::test]
async fn test_shell_timeout() {
    let runtime = test_runtime().await;
    let mut task = shell_task("slow", "sleep 10");
    task.options.timeout_ms = Some(1_000);
    runtime.storage.create_task(&task).await.unwrap();

    let started = Instant::now();
    let execution_id = runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();

    assert!(runtime.drain(Duration::from_secs(10)).await);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "timeout should fire promptly, took {:?}",
        started.elapsed()
    );

    let execution = runtime
        .storage
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Timeout);
    assert!(execution.error.as_deref().unwrap().contains("timed out"));

    let task = runtime.storage.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.run_count, 1);
    assert_eq!(task.failure_count, 1);
}

#[tokio::test]
async fn test_concurrency_cap_serializes_with_queue() {
    let runtime = test_runtime().await;
    let mut task = shell_task("serial", "sleep 0.3");
    task.options = TaskOptions {
        max_concurrent: Some(1),
        queue: true,
        ..Default::default()
    };
    runtime.storage.create_task(&task).await.unwrap();

    for _ in 0..3 {
        runtime
            .scheduler
            .execute_task(task.id, TriggerType::Manual, EventContext::new())
            .await
            .unwrap();
    }

    assert!(runtime.drain(Duration::from_secs(15)).await);

    let executions = executions_for(&runtime.storage, task.id).await;
    assert_eq!(executions.len(), 3);
    for execution in &executions {
        assert_eq!(execution.status, ExecutionStatus::Success);
    }

    // No overlap: each execution starts after the previous one completed.
    let mut by_start = executions.clone();
    by_start.sort_by_key(|e| e.started_at);
    for pair in by_start.windows(2) {
        let previous_completed = pair[0].completed_at.unwrap();
        let next_started = pair[1].started_at.unwrap();
        assert!(
            next_started >= previous_completed,
            "executions overlapped: {:?} < {:?}",
            next_started,
            previous_completed
        );
    }
}

#[tokio::test]
async fn test_capacity_exceeded_records_skip() {
    let runtime = test_runtime().await;
    let task = shell_task("busy", "sleep 0.4");
    runtime.storage.create_task(&task).await.unwrap();

    runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();
    // Second dispatch hits max_concurrent (default 1) with queueing off.
    let skipped_id = runtime
        .scheduler
        .execute_task(task.id, TriggerType::Cron, EventContext::new())
        .await
        .unwrap()
        .unwrap();

    let skipped = runtime
        .storage
        .get_execution(skipped_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(skipped.status, ExecutionStatus::Skipped);
    assert_eq!(
        skipped
            .trigger_context
            .get("skip_reason")
            .and_then(|v| v.as_str()),
        Some("max_concurrent reached")
    );

    assert!(runtime.drain(Duration::from_secs(10)).await);

    // Skips bump no counters.
    let task = runtime.storage.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.run_count, 1);
}

#[tokio::test]
async fn test_disabled_task_not_dispatched() {
    let runtime = test_runtime().await;
    let task = shell_task("off", "true").with_enabled(false);
    runtime.storage.create_task(&task).await.unwrap();

    let result = runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(executions_for(&runtime.storage, task.id).await.is_empty());
}

#[tokio::test]
async fn test_missing_task_not_dispatched() {
    let runtime = test_runtime().await;
    let result = runtime
        .scheduler
        .execute_task(uuid::Uuid::new_v4(), TriggerType::Manual, EventContext::new())
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_cancel_running_execution() {
    let runtime = test_runtime().await;
    let task = shell_task("long", "sleep 30");
    runtime.storage.create_task(&task).await.unwrap();

    let execution_id = runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();

    // Let it reach running, then cancel.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(runtime.scheduler.cancel(execution_id).await.unwrap());

    assert!(runtime.drain(Duration::from_secs(10)).await);

    let execution = runtime
        .storage
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert!(execution.completed_at.is_some());
}

#[tokio::test]
async fn test_cancel_unknown_execution_errors() {
    let runtime = test_runtime().await;
    assert!(runtime
        .scheduler
        .cancel(uuid::Uuid::new_v4())
        .await
        .is_err());
}

#[tokio::test]
async fn test_recovery_sweep() {
    let runtime = test_runtime().await;
    let task = shell_task("stale", "true");
    runtime.storage.create_task(&task).await.unwrap();

    // Simulate a crash: an execution stuck in running.
    let mut stuck = taskforge::domain::models::Execution::new(
        task.id,
        TriggerType::Manual,
        EventContext::new(),
    );
    runtime.storage.create_execution(&stuck).await.unwrap();
    stuck.start().unwrap();
    runtime.storage.update_execution(&stuck).await.unwrap();

    let swept = runtime.recover().await.unwrap();
    assert_eq!(swept, 1);

    let recovered = runtime
        .storage
        .get_execution(stuck.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recovered.status, ExecutionStatus::Failure);
    assert!(recovered.error.as_deref().unwrap().contains("recovered"));
    assert!(recovered.completed_at.is_some());
}
