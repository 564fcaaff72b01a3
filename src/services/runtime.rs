//! Service assembly.
//!
//! Wires storage, executors, scheduler, hook router, outcome pipeline, and
//! the cron timer together. The Scheduler↔Router↔Pipeline cycle is broken
//! here: the router and pipeline receive the scheduler only through the
//! narrow [`Dispatcher`] seam, and the scheduler reaches the pipeline
//! through a channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::errors::DomainResult;
use crate::domain::models::Config;
use crate::domain::ports::{Dispatcher, Storage};
use crate::services::cron::CronTimer;
use crate::services::hook_router::HookRouter;
use crate::services::outcome::OutcomePipeline;
use crate::services::registry::ExecutorRegistry;
use crate::services::scheduler::{Scheduler, SchedulerHandle};
use crate::services::tracker::ActivityTracker;

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

pub struct Runtime {
    pub storage: Arc<dyn Storage>,
    pub scheduler: Arc<Scheduler>,
    pub router: Arc<HookRouter>,
    cron: Option<CronTimer>,
    pipeline_handle: tokio::task::JoinHandle<()>,
    config: Config,
}

impl Runtime {
    pub fn new(config: Config, storage: Arc<dyn Storage>, registry: ExecutorRegistry) -> Self {
        let tracker = ActivityTracker::new();
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);

        let scheduler = Scheduler::new(
            storage.clone(),
            registry,
            outcome_tx,
            tracker.clone(),
            config.scheduler.clone(),
        );
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(SchedulerHandle(scheduler.clone()));

        let pipeline = OutcomePipeline::new(dispatcher.clone(), tracker);
        let pipeline_handle = pipeline.start(outcome_rx);

        let router = HookRouter::new(storage.clone(), dispatcher);

        Self {
            storage,
            scheduler,
            router,
            cron: None,
            pipeline_handle,
            config,
        }
    }

    /// Startup reconciliation sweep.
    pub async fn recover(&self) -> DomainResult<u64> {
        self.scheduler.recover().await
    }

    /// Start the cron timer (daemon mode).
    pub fn start_cron(&mut self) {
        let timer = CronTimer::new(
            self.storage.clone(),
            self.router.clone(),
            self.config.scheduler.clone(),
        );
        timer.start();
        self.cron = Some(timer);
    }

    /// Stop the cron timer if it is running.
    pub fn stop_cron(&self) {
        if let Some(cron) = &self.cron {
            cron.stop();
        }
    }

    /// Wait for all in-flight work (dispatches, handlers, scheduled
    /// retries) to drain. Used by one-shot CLI invocations.
    pub async fn drain(&self, deadline: Duration) -> bool {
        self.scheduler.drain(deadline).await
    }

    /// Stop background loops and close storage.
    pub async fn shutdown(self) -> DomainResult<()> {
        if let Some(cron) = &self.cron {
            cron.stop();
        }
        self.pipeline_handle.abort();
        self.storage.close().await
    }
}
