use crate::storage::Storage;
use async_trait::async_trait;
use refinecore::{EngineError, ExecutionId, NodeScope, StepError, StepOutcome, TaskType};
use std::collections::HashMap;
use std::sync::Arc;

/// Capability that performs one node's actual work.
///
/// Runners see a [`NodeScope`] narrowed to their own node plus the run-wide
/// fields, the persistence handle and the execution id. A returned `Err` is
/// an unexpected fault; deliberate failure is `StepOutcome::Failed` with the
/// reason going to the phase log.
#[async_trait]
pub trait StepRunner: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn run(
        &self,
        scope: &mut NodeScope<'_>,
        store: &dyn Storage,
        execution_id: ExecutionId,
    ) -> Result<StepOutcome, StepError>;
}

/// Mapping from task type to its single step-runner implementation
#[derive(Default)]
pub struct StepRegistry {
    runners: HashMap<TaskType, Arc<dyn StepRunner>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, runner: Arc<dyn StepRunner>) {
        let task_type = runner.task_type();
        tracing::debug!(%task_type, "registering step runner");
        self.runners.insert(task_type, runner);
    }

    pub fn runner(&self, task_type: TaskType) -> Result<&Arc<dyn StepRunner>, EngineError> {
        self.runners
            .get(&task_type)
            .ok_or(EngineError::NoRunner(task_type))
    }

    /// True once every task type has a runner
    pub fn is_complete(&self) -> bool {
        TaskType::ALL.iter().all(|t| self.runners.contains_key(t))
    }
}
