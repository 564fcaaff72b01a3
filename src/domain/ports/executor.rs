//! Executor and dispatch seams.
//!
//! The scheduler, hook router, and outcome pipeline form a dependency
//! cycle in spirit (router enqueues onto the scheduler, the pipeline
//! re-enqueues retries and chains). The cycle is broken with the narrow
//! traits below, injected at construction.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EventContext, Execution, ExecutionResult, Task, TaskKind, TriggerType};

/// A strategy that performs the work for one task type.
///
/// Executors may stream output/thinking through the storage contract while
/// running, but must not set terminal status; the scheduler maps the
/// returned result onto the execution.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The task type tag this executor serves.
    fn kind(&self) -> TaskKind;

    /// Perform the work. `cancel` is a cooperative signal: on cancellation
    /// the executor should wind down promptly and return a result with
    /// cancelled status and whatever output was captured.
    async fn execute(
        &self,
        task: &Task,
        execution: &Execution,
        cancel: CancellationToken,
    ) -> DomainResult<ExecutionResult>;
}

/// The scheduler's dispatch operation, as seen by the hook router and the
/// outcome pipeline.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Request an execution of a task. Returns the execution id when one
    /// was recorded (dispatched or skipped), `None` when the request was
    /// dropped (task missing/disabled) or parked in the task's queue.
    async fn dispatch(
        &self,
        task_id: Uuid,
        trigger_type: TriggerType,
        context: EventContext,
    ) -> DomainResult<Option<Uuid>>;

    /// Cancel an in-flight execution (cooperative, then unilateral after
    /// a grace window).
    async fn cancel_execution(&self, execution_id: Uuid) -> DomainResult<bool>;
}
