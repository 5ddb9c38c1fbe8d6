use crate::effective_code;
use async_trait::async_trait;
use refinecore::{ExecutionId, NodeScope, StepError, StepOutcome, TaskType};
use refineruntime::{StepRunner, Storage};

/// Entry-point step: seeds the run-wide starting and current code from the
/// node's literal inputs (or the code the run was started with).
pub struct SetContextStep;

#[async_trait]
impl StepRunner for SetContextStep {
    fn task_type(&self) -> TaskType {
        TaskType::SetContext
    }

    async fn run(
        &self,
        scope: &mut NodeScope<'_>,
        _store: &dyn Storage,
        _execution_id: ExecutionId,
    ) -> Result<StepOutcome, StepError> {
        let Some(code) = effective_code(scope) else {
            scope.error("no code available to set as context");
            return Ok(StepOutcome::Failed("no code available".into()));
        };

        if let Some(context) = scope.text_input("Context") {
            scope.set_temp("context", context);
        }

        scope.set_starting_code(code.clone());
        scope.set_code(code.clone());
        scope.set_output("Code", code);
        scope.info("context established");
        Ok(StepOutcome::Succeeded)
    }
}
