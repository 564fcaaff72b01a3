//! The scheduler: owns live task state, dispatches executions on trigger,
//! bounds concurrency, and tracks in-flight work.
//!
//! Locking discipline: `state` and `cancellations` are short-lived
//! bookkeeping locks, never held across storage calls or executor work.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EventContext, Execution, ExecutionResult, ResultStatus, SchedulerConfig, Task, TaskKind,
    TriggerType,
};
use crate::domain::ports::{Dispatcher, Storage};
use crate::services::outcome::OutcomeItem;
use crate::services::registry::ExecutorRegistry;
use crate::services::tracker::{ActivityGuard, ActivityTracker};

/// A dispatch parked because the task was at its concurrency cap.
struct Parked {
    trigger_type: TriggerType,
    context: EventContext,
    _guard: ActivityGuard,
}

#[derive(Default)]
struct SchedulerState {
    /// Per-task count of admitted (pending or running) executions.
    in_flight: HashMap<Uuid, u32>,
    /// Per-task FIFO of parked dispatches.
    queued: HashMap<Uuid, VecDeque<Parked>>,
}

/// Admission decision made under the state lock.
enum Admission {
    Dispatch,
    Parked,
    Skip(&'static str),
}

pub struct Scheduler {
    storage: Arc<dyn Storage>,
    registry: ExecutorRegistry,
    outcome_tx: mpsc::Sender<OutcomeItem>,
    tracker: ActivityTracker,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    cancellations: Mutex<HashMap<Uuid, CancellationToken>>,
    worker_permits: Arc<Semaphore>,
    /// Self-handle for spawning dispatch workers from `&self` methods.
    weak_self: Weak<Scheduler>,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: ExecutorRegistry,
        outcome_tx: mpsc::Sender<OutcomeItem>,
        tracker: ActivityTracker,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let worker_permits = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Arc::new_cyclic(|weak_self| Self {
            storage,
            registry,
            outcome_tx,
            tracker,
            config,
            state: Mutex::new(SchedulerState::default()),
            cancellations: Mutex::new(HashMap::new()),
            worker_permits,
            weak_self: weak_self.clone(),
        })
    }

    fn strong_self(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("scheduler dropped while in use")
    }

    /// Startup reconciliation: executions left non-terminal by a previous
    /// process are swept to `failure` with a recovery note.
    pub async fn recover(&self) -> DomainResult<u64> {
        let swept = self
            .storage
            .sweep_stale_executions("recovered: found non-terminal at startup")
            .await?;
        if swept > 0 {
            tracing::warn!(swept, "Swept stale executions from previous run");
        }
        Ok(swept)
    }

    /// Request an execution of a task.
    ///
    /// Missing or disabled tasks are dropped without creating an execution.
    /// At the concurrency cap the dispatch is parked (when the task opts
    /// into queueing) or recorded as `skipped` for audit.
    pub async fn execute_task(
        &self,
        task_id: Uuid,
        trigger_type: TriggerType,
        context: EventContext,
    ) -> DomainResult<Option<Uuid>> {
        let Some(task) = self.storage.get_task(task_id).await? else {
            tracing::debug!(%task_id, "Dispatch dropped: task not found");
            return Ok(None);
        };
        if !task.enabled {
            tracing::debug!(%task_id, task = %task.name, "Dispatch dropped: task disabled");
            return Ok(None);
        }

        let admission = {
            let mut state = self.state.lock().expect("scheduler state lock");
            let count = state.in_flight.entry(task.id).or_insert(0);
            if *count < task.options.max_concurrent() {
                *count += 1;
                Admission::Dispatch
            } else if task.options.queue {
                let limit = task.options.queue_limit.unwrap_or(self.config.queue_limit);
                let queue = state.queued.entry(task.id).or_default();
                if queue.len() < limit {
                    queue.push_back(Parked {
                        trigger_type,
                        context: context.clone(),
                        _guard: self.tracker.begin(),
                    });
                    Admission::Parked
                } else {
                    Admission::Skip("queue_full")
                }
            } else {
                Admission::Skip("max_concurrent reached")
            }
        };

        match admission {
            Admission::Parked => {
                tracing::debug!(task = %task.name, "Dispatch parked at concurrency cap");
                Ok(None)
            }
            Admission::Skip(reason) => {
                let execution = Execution::skipped(task.id, trigger_type, context, reason);
                self.storage.create_execution(&execution).await?;
                tracing::info!(
                    task = %task.name,
                    execution_id = %execution.id,
                    reason,
                    "Dispatch skipped"
                );
                Ok(Some(execution.id))
            }
            Admission::Dispatch => match self.begin_dispatch(task, trigger_type, context).await {
                Ok(id) => Ok(Some(id)),
                Err(e) => {
                    self.release_slot(task_id);
                    Err(e)
                }
            },
        }
    }

    /// Create the pending execution and hand it to a dispatch worker. The
    /// in-flight slot is already reserved.
    async fn begin_dispatch(
        &self,
        task: Task,
        trigger_type: TriggerType,
        context: EventContext,
    ) -> DomainResult<Uuid> {
        let execution = Execution::new(task.id, trigger_type, context);
        self.storage.create_execution(&execution).await?;
        let execution_id = execution.id;

        let scheduler = self.strong_self();
        let guard = self.tracker.begin();
        tokio::spawn(async move {
            scheduler.run_dispatch(task, execution, guard).await;
        });
        Ok(execution_id)
    }

    /// Dispatch worker: drives one execution from `pending` to terminal,
    /// finalizes it in storage, and hands it to the outcome pipeline.
    async fn run_dispatch(
        self: Arc<Self>,
        task: Task,
        mut execution: Execution,
        guard: ActivityGuard,
    ) {
        let _permit = self
            .worker_permits
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore closed");

        if let Err(e) = execution.start() {
            tracing::error!(execution_id = %execution.id, error = %e, "Invalid start transition");
            self.finish_bookkeeping(task.id);
            drop(guard);
            return;
        }
        if let Err(e) = self.storage.update_execution(&execution).await {
            // Abort the dispatch; the row stays pending and is swept on the
            // next startup.
            tracing::error!(execution_id = %execution.id, error = %e, "Storage write failed, aborting dispatch");
            self.finish_bookkeeping(task.id);
            drop(guard);
            return;
        }

        let token = CancellationToken::new();
        self.cancellations
            .lock()
            .expect("cancellations lock")
            .insert(execution.id, token.clone());

        let result = self.run_executor(&task, &execution, token).await;

        self.cancellations
            .lock()
            .expect("cancellations lock")
            .remove(&execution.id);

        if let Err(e) = execution.finish(result) {
            tracing::error!(execution_id = %execution.id, error = %e, "Invalid finish transition");
        }

        let task_id = execution.task_id;
        match self.storage.finalize_execution(&execution).await {
            Ok(()) => {
                tracing::info!(
                    task = %task.name,
                    execution_id = %execution.id,
                    status = execution.status.as_str(),
                    duration_ms = execution.duration_ms,
                    "Execution finished"
                );
                let item = OutcomeItem {
                    task,
                    execution,
                    _guard: self.tracker.begin(),
                };
                if self.outcome_tx.send(item).await.is_err() {
                    tracing::warn!("Outcome pipeline is gone, dropping terminal execution");
                }
            }
            Err(e) => {
                tracing::error!(
                    execution_id = %execution.id,
                    error = %e,
                    "Failed to finalize execution; will be reconciled on next startup"
                );
            }
        }

        self.finish_bookkeeping(task_id);
        drop(guard);
    }

    /// Run the executor under the task's deadline. On deadline the cancel
    /// token is fired and the executor gets a bounded grace period to wind
    /// down before the execution is marked unilaterally.
    async fn run_executor(
        &self,
        task: &Task,
        execution: &Execution,
        token: CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();

        let executor = match self.registry.lookup(task.kind()) {
            Ok(executor) => executor,
            Err(e) => return failure_result(e.to_string(), 0),
        };

        let timeout_ms = task.options.timeout_ms.unwrap_or(match task.kind() {
            TaskKind::Shell => self.config.default_shell_timeout_ms,
            TaskKind::Agent => self.config.default_agent_timeout_ms,
        });
        let grace = Duration::from_millis(self.config.cancel_grace_ms);

        let fut = executor.execute(task, execution, token.clone());
        tokio::pin!(fut);

        tokio::select! {
            res = &mut fut => flatten_result(res, started),
            () = token.cancelled() => {
                // External cancel; give the executor a grace window.
                let mut result = match tokio::time::timeout(grace, &mut fut).await {
                    Ok(res) => flatten_result(res, started),
                    Err(_) => {
                        tracing::warn!(execution_id = %execution.id, "Executor ignored cancel, orphaning it");
                        failure_result(String::new(), elapsed_ms(started))
                    }
                };
                result.status = ResultStatus::Cancelled;
                if result.error.is_none() || result.error.as_deref() == Some("") {
                    result.error = Some("execution cancelled".to_string());
                }
                result
            },
            () = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                token.cancel();
                let mut result = match tokio::time::timeout(grace, &mut fut).await {
                    Ok(res) => flatten_result(res, started),
                    Err(_) => {
                        tracing::warn!(execution_id = %execution.id, "Executor ignored deadline cancel, orphaning it");
                        failure_result(String::new(), elapsed_ms(started))
                    }
                };
                result.status = ResultStatus::Timeout;
                result.error = Some(format!("execution timed out after {timeout_ms}ms"));
                result
            },
        }
    }

    /// Release the task's in-flight slot and, when a parked dispatch is
    /// waiting, hand the freed slot straight to it (strict FIFO per task).
    fn finish_bookkeeping(&self, task_id: Uuid) {
        let parked = {
            let mut state = self.state.lock().expect("scheduler state lock");
            if let Some(count) = state.in_flight.get_mut(&task_id) {
                *count = count.saturating_sub(1);
            }
            let popped = state.queued.get_mut(&task_id).and_then(VecDeque::pop_front);
            if popped.is_some() {
                // Reserve the freed slot for the parked dispatch before
                // releasing the lock.
                *state.in_flight.entry(task_id).or_insert(0) += 1;
            }
            popped
        };

        if let Some(parked) = parked {
            let scheduler = self.strong_self();
            tokio::spawn(async move {
                scheduler.run_parked(task_id, parked).await;
            });
        }
    }

    fn release_slot(&self, task_id: Uuid) {
        let mut state = self.state.lock().expect("scheduler state lock");
        if let Some(count) = state.in_flight.get_mut(&task_id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Run a parked dispatch in its reserved slot. The task is re-loaded:
    /// it may have been disabled or deleted while parked.
    async fn run_parked(self: Arc<Self>, task_id: Uuid, parked: Parked) {
        let Parked {
            trigger_type,
            context,
            _guard,
        } = parked;

        let task = match self.storage.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::debug!(%task_id, "Parked dispatch dropped: task deleted");
                self.finish_bookkeeping(task_id);
                return;
            }
            Err(e) => {
                tracing::error!(%task_id, error = %e, "Failed to load task for parked dispatch");
                self.finish_bookkeeping(task_id);
                return;
            }
        };

        if !task.enabled {
            // Disabled between enqueue and dispatch: record for audit.
            let execution =
                Execution::skipped(task_id, trigger_type, context, "task disabled before dispatch");
            if let Err(e) = self.storage.create_execution(&execution).await {
                tracing::error!(%task_id, error = %e, "Failed to record skipped execution");
            }
            self.finish_bookkeeping(task_id);
            return;
        }

        let execution = Execution::new(task_id, trigger_type, context);
        if let Err(e) = self.storage.create_execution(&execution).await {
            tracing::error!(%task_id, error = %e, "Failed to create execution for parked dispatch");
            self.finish_bookkeeping(task_id);
            return;
        }

        let guard = self.tracker.begin();
        self.clone().run_dispatch(task, execution, guard).await;
    }

    /// Signal cancellation to an in-flight execution. Returns false when
    /// the execution exists but is no longer in flight.
    pub async fn cancel(&self, execution_id: Uuid) -> DomainResult<bool> {
        let token = self
            .cancellations
            .lock()
            .expect("cancellations lock")
            .get(&execution_id)
            .cloned();
        match token {
            Some(token) => {
                tracing::info!(%execution_id, "Cancelling execution");
                token.cancel();
                Ok(true)
            }
            None => match self.storage.get_execution(execution_id).await? {
                Some(_) => Ok(false),
                None => Err(DomainError::ExecutionNotFound(execution_id)),
            },
        }
    }

    /// Current number of admitted executions for a task (inspection).
    pub fn in_flight_count(&self, task_id: Uuid) -> u32 {
        self.state
            .lock()
            .expect("scheduler state lock")
            .in_flight
            .get(&task_id)
            .copied()
            .unwrap_or(0)
    }

    /// Wait until all dispatch work (including parked dispatches, outcome
    /// handlers, and scheduled retries) has drained.
    pub async fn drain(&self, deadline: Duration) -> bool {
        self.tracker.wait_idle(deadline).await
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn failure_result(error: String, duration_ms: i64) -> ExecutionResult {
    ExecutionResult {
        status: ResultStatus::Failure,
        output: String::new(),
        error: if error.is_empty() { None } else { Some(error) },
        exit_code: None,
        duration_ms,
        usage: None,
    }
}

fn flatten_result(res: DomainResult<ExecutionResult>, started: Instant) -> ExecutionResult {
    match res {
        Ok(result) => result,
        Err(e) => failure_result(e.to_string(), elapsed_ms(started)),
    }
}

/// The scheduler's dispatch seam, handed to the hook router and the
/// outcome pipeline.
#[derive(Clone)]
pub struct SchedulerHandle(pub Arc<Scheduler>);

#[async_trait]
impl Dispatcher for SchedulerHandle {
    async fn dispatch(
        &self,
        task_id: Uuid,
        trigger_type: TriggerType,
        context: EventContext,
    ) -> DomainResult<Option<Uuid>> {
        self.0.execute_task(task_id, trigger_type, context).await
    }

    async fn cancel_execution(&self, execution_id: Uuid) -> DomainResult<bool> {
        self.0.cancel(execution_id).await
    }
}
