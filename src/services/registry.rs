//! Executor registry.
//!
//! Immutable table mapping a task's type tag to the executor that performs
//! its work. Built once at startup; the scheduler resolves through it on
//! every dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TaskKind;
use crate::domain::ports::Executor;

#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskKind, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(executor.kind(), executor);
        self
    }

    pub fn lookup(&self, kind: TaskKind) -> DomainResult<Arc<dyn Executor>> {
        self.executors
            .get(&kind)
            .cloned()
            .ok_or_else(|| DomainError::UnknownTaskType(kind.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Execution, ExecutionResult, Task};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct NullExecutor(TaskKind);

    #[async_trait]
    impl Executor for NullExecutor {
        fn kind(&self) -> TaskKind {
            self.0
        }

        async fn execute(
            &self,
            _task: &Task,
            _execution: &Execution,
            _cancel: CancellationToken,
        ) -> DomainResult<ExecutionResult> {
            Ok(ExecutionResult::success("", 0))
        }
    }

    #[test]
    fn test_lookup_registered() {
        let registry = ExecutorRegistry::new().register(Arc::new(NullExecutor(TaskKind::Shell)));
        assert!(registry.lookup(TaskKind::Shell).is_ok());
        assert!(matches!(
            registry.lookup(TaskKind::Agent),
            Err(DomainError::UnknownTaskType(_))
        ));
    }
}
