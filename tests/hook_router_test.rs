//! Event routing: subscriber lookup, pattern filters, isolation.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use taskforge::domain::models::{
    EventContext, ExecutionStatus, HookEventType, Task, TaskConfig, Trigger, TriggerType,
};

use common::{executions_for, test_runtime};

fn file_saved_task(name: &str, patterns: Vec<&str>) -> Task {
    Task::new(
        name,
        TaskConfig::Shell {
            command: "true".into(),
            workdir: None,
            env: HashMap::new(),
        },
        Trigger::Event {
            event: HookEventType::FileSaved,
            filters: HashMap::from([(
                "file_path".to_string(),
                patterns.into_iter().map(String::from).collect(),
            )]),
        },
    )
}

fn context(entries: &[(&str, &str)]) -> EventContext {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

#[tokio::test]
async fn test_event_with_matching_pattern_dispatches() {
    let runtime = test_runtime().await;
    let task = file_saved_task("on-ts-save", vec!["**/*.ts"]);
    runtime.storage.create_task(&task).await.unwrap();

    runtime
        .router
        .handle_event(
            HookEventType::FileSaved,
            context(&[("file_path", "src/a.ts")]),
        )
        .await;
    assert!(runtime.drain(Duration::from_secs(10)).await);

    let executions = executions_for(&runtime.storage, task.id).await;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Success);
    assert_eq!(executions[0].trigger_type, TriggerType::Event);
    assert_eq!(
        executions[0]
            .trigger_context
            .get("event_type")
            .and_then(|v| v.as_str()),
        Some("file_saved")
    );
}

#[tokio::test]
async fn test_event_with_non_matching_pattern_is_noop() {
    let runtime = test_runtime().await;
    let task = file_saved_task("on-ts-save", vec!["**/*.ts"]);
    runtime.storage.create_task(&task).await.unwrap();

    runtime
        .router
        .handle_event(
            HookEventType::FileSaved,
            context(&[("file_path", "README.md")]),
        )
        .await;
    assert!(runtime.drain(Duration::from_secs(5)).await);

    assert!(executions_for(&runtime.storage, task.id).await.is_empty());
}

#[tokio::test]
async fn test_event_with_no_subscribers_is_noop() {
    let runtime = test_runtime().await;
    runtime
        .router
        .handle_event(
            HookEventType::SessionStart,
            context(&[("session_id", "abc")]),
        )
        .await;
    assert!(runtime.drain(Duration::from_secs(5)).await);

    let executions = runtime
        .storage
        .load_executions(Default::default())
        .await
        .unwrap();
    assert!(executions.is_empty());
}

#[tokio::test]
async fn test_event_fans_out_to_all_matching_subscribers() {
    let runtime = test_runtime().await;
    let ts_task = file_saved_task("ts-watcher", vec!["**/*.ts"]);
    let all_task = file_saved_task("all-watcher", vec!["**/*"]);
    let md_task = file_saved_task("md-watcher", vec!["**/*.md"]);
    for task in [&ts_task, &all_task, &md_task] {
        runtime.storage.create_task(task).await.unwrap();
    }

    runtime
        .router
        .handle_event(
            HookEventType::FileSaved,
            context(&[("file_path", "src/a.ts")]),
        )
        .await;
    assert!(runtime.drain(Duration::from_secs(10)).await);

    assert_eq!(executions_for(&runtime.storage, ts_task.id).await.len(), 1);
    assert_eq!(executions_for(&runtime.storage, all_task.id).await.len(), 1);
    assert!(executions_for(&runtime.storage, md_task.id).await.is_empty());
}

#[tokio::test]
async fn test_disabled_subscriber_not_dispatched() {
    let runtime = test_runtime().await;
    let task = file_saved_task("off", vec!["**/*"]).with_enabled(false);
    runtime.storage.create_task(&task).await.unwrap();

    runtime
        .router
        .handle_event(HookEventType::FileSaved, context(&[("file_path", "a.txt")]))
        .await;
    assert!(runtime.drain(Duration::from_secs(5)).await);

    assert!(executions_for(&runtime.storage, task.id).await.is_empty());
}

#[tokio::test]
async fn test_extension_and_regex_patterns_route() {
    let runtime = test_runtime().await;
    let ext_task = file_saved_task("ext", vec![".rs"]);
    let regex_task = file_saved_task("regex", vec![r"/^tests\/.*_test\.rs$/"]);
    for task in [&ext_task, &regex_task] {
        runtime.storage.create_task(task).await.unwrap();
    }

    runtime
        .router
        .handle_event(
            HookEventType::FileSaved,
            context(&[("file_path", "tests/scheduler_test.rs")]),
        )
        .await;
    assert!(runtime.drain(Duration::from_secs(10)).await);

    assert_eq!(executions_for(&runtime.storage, ext_task.id).await.len(), 1);
    assert_eq!(
        executions_for(&runtime.storage, regex_task.id).await.len(),
        1
    );
}

#[tokio::test]
async fn test_cron_tick_event_is_task_scoped() {
    let runtime = test_runtime().await;
    let mut task = common::shell_task("cron-target", "true");
    task.trigger = Trigger::Cron {
        schedule: "* * * * *".into(),
    };
    runtime.storage.create_task(&task).await.unwrap();

    let mut ctx = EventContext::new();
    ctx.insert("task_id".into(), json!(task.id.to_string()));
    runtime.router.handle_event(HookEventType::CronTick, ctx).await;
    assert!(runtime.drain(Duration::from_secs(10)).await);

    let executions = executions_for(&runtime.storage, task.id).await;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].trigger_type, TriggerType::Cron);
}

#[tokio::test]
async fn test_cron_tick_without_task_id_is_noop() {
    let runtime = test_runtime().await;
    runtime
        .router
        .handle_event(HookEventType::CronTick, EventContext::new())
        .await;
    assert!(runtime.drain(Duration::from_secs(5)).await);

    let executions = runtime
        .storage
        .load_executions(Default::default())
        .await
        .unwrap();
    assert!(executions.is_empty());
}
