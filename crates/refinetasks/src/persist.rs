use async_trait::async_trait;
use refinecore::{ArtifactKind, ExecutionId, NodeScope, StepError, StepOutcome, TaskType};
use refineruntime::{ComponentArtifacts, StepRunner, Storage};
use std::collections::HashMap;

const ARTIFACTS: [ArtifactKind; 4] = [
    ArtifactKind::UnitTests,
    ArtifactKind::E2eTests,
    ArtifactKind::InlineDocs,
    ArtifactKind::ReadmeDocs,
];

/// Writes the current code and every produced artifact back to the
/// component row.
pub struct SaveResultsStep;

#[async_trait]
impl StepRunner for SaveResultsStep {
    fn task_type(&self) -> TaskType {
        TaskType::SaveResults
    }

    async fn run(
        &self,
        scope: &mut NodeScope<'_>,
        store: &dyn Storage,
        _execution_id: ExecutionId,
    ) -> Result<StepOutcome, StepError> {
        let code = scope.code();
        if code.is_null() {
            scope.error("no code to save");
            return Ok(StepOutcome::Failed("no code to save".into()));
        }

        let mut generated = HashMap::new();
        for kind in ARTIFACTS {
            let value = scope.artifact(kind);
            if !value.is_null() {
                generated.insert(kind, value);
            }
        }

        let count = generated.len();
        store
            .update_component(scope.component_id(), ComponentArtifacts { code, generated })
            .await?;

        scope.info(format!("saved code and {count} artifact(s) to component"));
        Ok(StepOutcome::Succeeded)
    }
}
