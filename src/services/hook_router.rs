//! Hook event router.
//!
//! Maps external events to the tasks that subscribe to them, applying
//! pattern filters over context fields, and enqueues matches onto the
//! scheduler. Dispatch is best-effort: one subscriber's error never
//! prevents the others from running.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::models::{
    context_str, EventContext, HookEventType, Task, Trigger, TriggerType,
};
use crate::domain::ports::{Dispatcher, Storage, TaskFilter};
use crate::services::pattern;

pub struct HookRouter {
    storage: Arc<dyn Storage>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl HookRouter {
    pub fn new(storage: Arc<dyn Storage>, dispatcher: Arc<dyn Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            storage,
            dispatcher,
        })
    }

    /// Deliver one event. Errors are logged and swallowed at this
    /// boundary.
    pub async fn handle_event(&self, event: HookEventType, context: EventContext) {
        // Cron ticks arrive task-scoped; the subscriber lookup is
        // short-circuited.
        if event == HookEventType::CronTick {
            let task_id = context_str(&context, "task_id")
                .and_then(|s| Uuid::parse_str(&s).ok());
            match task_id {
                Some(task_id) => {
                    if let Err(e) = self
                        .dispatcher
                        .dispatch(task_id, TriggerType::Cron, context)
                        .await
                    {
                        tracing::warn!(%task_id, error = %e, "Cron dispatch failed");
                    }
                }
                None => tracing::warn!("cron_tick event without a task_id, ignoring"),
            }
            return;
        }

        let subscribers = match self.storage.load_tasks(TaskFilter::subscribers(event)).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(event = event.as_str(), error = %e, "Failed to load event subscribers");
                return;
            }
        };

        let mut matched = subscribers
            .into_iter()
            .filter(|task| Self::trigger_matches(task, &context))
            .collect::<Vec<_>>();
        // Higher-priority tasks are dispatched first.
        matched.sort_by(|a, b| b.options.priority.cmp(&a.options.priority));

        if matched.is_empty() {
            tracing::debug!(event = event.as_str(), "No subscribers matched");
            return;
        }

        let trigger_type = if event == HookEventType::Manual {
            TriggerType::Manual
        } else {
            TriggerType::Event
        };

        for task in matched {
            let mut dispatch_context = context.clone();
            dispatch_context.insert(
                "event_type".into(),
                serde_json::Value::String(event.as_str().to_string()),
            );
            match self
                .dispatcher
                .dispatch(task.id, trigger_type, dispatch_context)
                .await
            {
                Ok(Some(execution_id)) => {
                    tracing::debug!(
                        event = event.as_str(),
                        task = %task.name,
                        %execution_id,
                        "Event dispatched"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        event = event.as_str(),
                        task = %task.name,
                        error = %e,
                        "Event dispatch failed for subscriber"
                    );
                }
            }
        }
    }

    /// Apply the trigger's filter predicate: AND across pattern families,
    /// OR within a family. A family over a missing context field fails.
    fn trigger_matches(task: &Task, context: &EventContext) -> bool {
        let Trigger::Event { filters, .. } = &task.trigger else {
            return false;
        };
        filters.iter().all(|(field, patterns)| {
            match context_str(context, field) {
                Some(value) => pattern::matches_any(&value, patterns),
                None => false,
            }
        })
    }
}
