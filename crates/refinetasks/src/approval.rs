use async_trait::async_trait;
use refinecore::{
    approval_slots, ExecutionId, NodeScope, StepError, StepOutcome, TaskType,
};
use refineruntime::{StepRunner, Storage};

/// The approval gate: freezes the original/pending code pair into this
/// node's temp slots and signals suspension. The resume path reads the
/// slots back and re-admits this phase as completed.
pub struct ApprovalGateStep;

#[async_trait]
impl StepRunner for ApprovalGateStep {
    fn task_type(&self) -> TaskType {
        TaskType::RequestApproval
    }

    async fn run(
        &self,
        scope: &mut NodeScope<'_>,
        _store: &dyn Storage,
        _execution_id: ExecutionId,
    ) -> Result<StepOutcome, StepError> {
        let pending = scope.code();
        let original = scope.starting_code();
        let (Some(pending), Some(original)) = (pending.as_str(), original.as_str()) else {
            scope.error("approval requires both current and starting code");
            return Ok(StepOutcome::Failed(
                "missing current or starting code".into(),
            ));
        };
        let pending = pending.to_string();
        let original = original.to_string();

        // the only values that must survive the suspension
        scope.set_temp(approval_slots::ORIGINAL_CODE, original);
        scope.set_temp(approval_slots::PENDING_CODE, pending.clone());

        // downstream readers see the candidate while the run is parked;
        // the original stays recoverable from the temp slot
        scope.set_code(pending);
        scope.info("awaiting human approval");
        Ok(StepOutcome::Suspended)
    }
}
