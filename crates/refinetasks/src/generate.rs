use crate::{effective_code, CodeAssistant};
use async_trait::async_trait;
use refinecore::{ArtifactKind, ExecutionId, NodeScope, StepError, StepOutcome, TaskType};
use refineruntime::{StepRunner, Storage};
use std::sync::Arc;

/// Shared shape of the four artifact-generating steps: feed the current
/// code to the assistant and drop the result into a run-wide artifact slot
/// plus a named output.
pub struct GenerateArtifactStep {
    task_type: TaskType,
    instruction: &'static str,
    artifact: ArtifactKind,
    output: &'static str,
    assistant: Arc<dyn CodeAssistant>,
}

impl GenerateArtifactStep {
    pub fn unit_tests(assistant: Arc<dyn CodeAssistant>) -> Self {
        Self {
            task_type: TaskType::AddUnitTests,
            instruction: "write unit tests for this code",
            artifact: ArtifactKind::UnitTests,
            output: "Tests",
            assistant,
        }
    }

    pub fn e2e_tests(assistant: Arc<dyn CodeAssistant>) -> Self {
        Self {
            task_type: TaskType::AddE2eTests,
            instruction: "write end-to-end tests for this code",
            artifact: ArtifactKind::E2eTests,
            output: "Tests",
            assistant,
        }
    }

    pub fn inline_docs(assistant: Arc<dyn CodeAssistant>) -> Self {
        Self {
            task_type: TaskType::AddInlineDocs,
            instruction: "add inline documentation comments to this code",
            artifact: ArtifactKind::InlineDocs,
            output: "Docs",
            assistant,
        }
    }

    pub fn readme_docs(assistant: Arc<dyn CodeAssistant>) -> Self {
        Self {
            task_type: TaskType::AddReadmeDocs,
            instruction: "write a readme describing this code",
            artifact: ArtifactKind::ReadmeDocs,
            output: "Docs",
            assistant,
        }
    }
}

#[async_trait]
impl StepRunner for GenerateArtifactStep {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn run(
        &self,
        scope: &mut NodeScope<'_>,
        _store: &dyn Storage,
        _execution_id: ExecutionId,
    ) -> Result<StepOutcome, StepError> {
        let Some(code) = effective_code(scope) else {
            scope.error("no code available to generate from");
            return Ok(StepOutcome::Failed("no code available".into()));
        };

        let generated = self.assistant.transform(self.instruction, &code).await?;

        scope.set_artifact(self.artifact, generated.clone());
        scope.set_output(self.output, generated);
        scope.info(format!("generated {}", self.output.to_lowercase()));
        Ok(StepOutcome::Succeeded)
    }
}
