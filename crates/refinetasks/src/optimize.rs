use crate::{effective_code, CodeAssistant};
use async_trait::async_trait;
use refinecore::{ExecutionId, NodeScope, StepError, StepOutcome, TaskType};
use refineruntime::{StepRunner, Storage};
use std::sync::Arc;

const DEFAULT_INSTRUCTION: &str = "optimize this code for readability and performance";

/// Rewrites the current code through the assistant and publishes the result
/// as the new run-wide code.
pub struct OptimizeCodeStep {
    assistant: Arc<dyn CodeAssistant>,
}

impl OptimizeCodeStep {
    pub fn new(assistant: Arc<dyn CodeAssistant>) -> Self {
        Self { assistant }
    }
}

#[async_trait]
impl StepRunner for OptimizeCodeStep {
    fn task_type(&self) -> TaskType {
        TaskType::OptimizeCode
    }

    async fn run(
        &self,
        scope: &mut NodeScope<'_>,
        _store: &dyn Storage,
        _execution_id: ExecutionId,
    ) -> Result<StepOutcome, StepError> {
        let Some(code) = effective_code(scope) else {
            scope.error("no code available to optimize");
            return Ok(StepOutcome::Failed("no code available".into()));
        };
        let instruction = scope
            .text_input("Instructions")
            .unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string());

        let optimized = self.assistant.transform(&instruction, &code).await?;

        scope.set_code(optimized.clone());
        scope.set_output("Code", optimized);
        scope.info("code optimized");
        Ok(StepOutcome::Succeeded)
    }
}
