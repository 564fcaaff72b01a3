//! Cron timer.
//!
//! Registers the schedules of enabled cron tasks and fires task-scoped
//! `cron_tick` events through the hook router. Ticks are never queued by
//! the timer; overlap policy is the scheduler's concern (skip or queue per
//! task options).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::models::{parse_cron_schedule, EventContext, HookEventType, SchedulerConfig, Trigger};
use crate::domain::ports::{Storage, TaskFilter};
use crate::services::hook_router::HookRouter;

struct CronEntry {
    task_id: Uuid,
    schedule: cron::Schedule,
    /// Reference point for the next-fire computation: last fire, or
    /// registration time before the first fire.
    reference: DateTime<Utc>,
}

pub struct CronTimer {
    storage: Arc<dyn Storage>,
    router: Arc<HookRouter>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
}

impl CronTimer {
    pub fn new(
        storage: Arc<dyn Storage>,
        router: Arc<HookRouter>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            storage,
            router,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load the schedules of all enabled cron tasks. Existing reference
    /// times are preserved across reloads so a reload never replays fires.
    async fn load_entries(
        storage: &Arc<dyn Storage>,
        previous: &[CronEntry],
    ) -> Vec<CronEntry> {
        let tasks = match storage.load_tasks(TaskFilter::cron_tasks()).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load cron tasks");
                return Vec::new();
            }
        };

        let now = Utc::now();
        let mut entries = Vec::with_capacity(tasks.len());
        for task in tasks {
            let Trigger::Cron { schedule } = &task.trigger else {
                continue;
            };
            let schedule = match parse_cron_schedule(schedule) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Validated at creation; a bad row only logs here.
                    tracing::warn!(task = %task.name, error = %e, "Skipping unparseable cron schedule");
                    continue;
                }
            };
            let reference = previous
                .iter()
                .find(|entry| entry.task_id == task.id)
                .map_or(now, |entry| entry.reference);
            entries.push(CronEntry {
                task_id: task.id,
                schedule,
                reference,
            });
        }
        tracing::debug!(count = entries.len(), "Registered cron schedules");
        entries
    }

    /// Start the tick loop. Returns a handle; call [`stop`](Self::stop) to
    /// end it.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let storage = self.storage.clone();
        let router = self.router.clone();
        let running = self.running.clone();
        let tick = Duration::from_millis(self.config.cron_tick_interval_ms.max(100));
        let refresh_every =
            (self.config.cron_refresh_interval_ms / self.config.cron_tick_interval_ms.max(1)).max(1);

        tokio::spawn(async move {
            let mut entries = Self::load_entries(&storage, &[]).await;
            let mut tick_count: u64 = 0;

            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(tick).await;
                tick_count += 1;

                if tick_count % refresh_every == 0 {
                    entries = Self::load_entries(&storage, &entries).await;
                }

                let now = Utc::now();
                for entry in &mut entries {
                    let due = entry
                        .schedule
                        .after(&entry.reference)
                        .next()
                        .is_some_and(|next| now >= next);
                    if !due {
                        continue;
                    }
                    entry.reference = now;

                    let mut context = EventContext::new();
                    context.insert("task_id".into(), json!(entry.task_id.to_string()));
                    context.insert("tick_at".into(), json!(now.to_rfc3339()));
                    router.handle_event(HookEventType::CronTick, context).await;
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
