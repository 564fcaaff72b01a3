//! Retry handler behavior: attempt numbering, backoff context, budget.

mod common;

use std::time::Duration;

use taskforge::domain::models::{
    Backoff, EventContext, ExecutionStatus, Handler, RetryConfig, RetryOn, TriggerType,
};

use common::{executions_for, shell_task, test_runtime};

fn retry_handler(max_attempts: u32, on: RetryOn) -> Handler {
    Handler::Retry(RetryConfig {
        max_attempts,
        backoff: Backoff::Exponential,
        initial_delay_ms: 100,
        max_delay_ms: 5_000,
        on,
    })
}

#[tokio::test]
async fn test_retry_on_failure_until_budget_exhausted() {
    let runtime = test_runtime().await;
    let task = shell_task("flaky", "exit 7").with_handler(retry_handler(3, RetryOn::Failure));
    runtime.storage.create_task(&task).await.unwrap();

    runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();

    assert!(runtime.drain(Duration::from_secs(15)).await);

    let executions = executions_for(&runtime.storage, task.id).await;
    assert_eq!(executions.len(), 3, "initial attempt plus two retries");

    assert_eq!(executions[0].trigger_type, TriggerType::Manual);
    for execution in &executions {
        assert_eq!(execution.status, ExecutionStatus::Failure);
    }

    let retries: Vec<_> = executions
        .iter()
        .filter(|e| e.trigger_type == TriggerType::Retry)
        .collect();
    assert_eq!(retries.len(), 2);

    // Attempt numbering is contiguous from 1, strictly below max_attempts.
    assert_eq!(retries[0].retry_count(), 1);
    assert_eq!(retries[1].retry_count(), 2);

    // Exponential delays: 100ms then 200ms.
    assert_eq!(
        retries[0]
            .trigger_context
            .get("retry_delay_ms")
            .and_then(|v| v.as_u64()),
        Some(100)
    );
    assert_eq!(
        retries[1]
            .trigger_context
            .get("retry_delay_ms")
            .and_then(|v| v.as_u64()),
        Some(200)
    );

    // Each retry carries its predecessor's id and error.
    assert_eq!(
        retries[0]
            .trigger_context
            .get("previous_execution_id")
            .and_then(|v| v.as_str()),
        Some(executions[0].id.to_string().as_str())
    );
    assert!(retries[0]
        .trigger_context
        .get("previous_error")
        .and_then(|v| v.as_str())
        .unwrap()
        .contains("7"));

    let task = runtime.storage.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.run_count, 3);
    assert_eq!(task.failure_count, 3);
}

#[tokio::test]
async fn test_no_retry_on_success() {
    let runtime = test_runtime().await;
    let task = shell_task("fine", "true").with_handler(retry_handler(3, RetryOn::Any));
    runtime.storage.create_task(&task).await.unwrap();

    runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();
    assert!(runtime.drain(Duration::from_secs(10)).await);

    assert_eq!(executions_for(&runtime.storage, task.id).await.len(), 1);
}

#[tokio::test]
async fn test_retry_on_timeout_filter() {
    let runtime = test_runtime().await;

    // `on: timeout` must not react to plain failures.
    let task = shell_task("fails", "exit 1").with_handler(retry_handler(3, RetryOn::Timeout));
    runtime.storage.create_task(&task).await.unwrap();
    runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();
    assert!(runtime.drain(Duration::from_secs(10)).await);
    assert_eq!(executions_for(&runtime.storage, task.id).await.len(), 1);

    // But it retries a timeout.
    let mut slow = shell_task("slow", "sleep 5").with_handler(retry_handler(2, RetryOn::Timeout));
    slow.options.timeout_ms = Some(300);
    runtime.storage.create_task(&slow).await.unwrap();
    runtime
        .scheduler
        .execute_task(slow.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();
    assert!(runtime.drain(Duration::from_secs(20)).await);

    let executions = executions_for(&runtime.storage, slow.id).await;
    assert_eq!(executions.len(), 2, "initial timeout plus one retry");
    assert_eq!(executions[1].trigger_type, TriggerType::Retry);
    assert_eq!(executions[1].retry_count(), 1);
}

#[tokio::test]
async fn test_max_attempts_one_never_retries() {
    let runtime = test_runtime().await;
    let task = shell_task("once", "exit 1").with_handler(retry_handler(1, RetryOn::Any));
    runtime.storage.create_task(&task).await.unwrap();

    runtime
        .scheduler
        .execute_task(task.id, TriggerType::Manual, EventContext::new())
        .await
        .unwrap()
        .unwrap();
    assert!(runtime.drain(Duration::from_secs(10)).await);

    assert_eq!(executions_for(&runtime.storage, task.id).await.len(), 1);
}
