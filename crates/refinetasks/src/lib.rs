//! Step runner library
//!
//! One runner per task type. `runner_for` is an exhaustive match, so adding
//! a task type will not compile until it has exactly one implementation.

mod approval;
mod assistant;
mod context;
mod generate;
mod optimize;
mod persist;

pub use approval::ApprovalGateStep;
pub use assistant::{AnnotatingAssistant, CodeAssistant};
pub use context::SetContextStep;
pub use generate::GenerateArtifactStep;
pub use optimize::OptimizeCodeStep;
pub use persist::SaveResultsStep;

use refinecore::{NodeScope, TaskType};
use refineruntime::{StepRegistry, StepRunner};
use std::sync::Arc;

/// The single runner implementation for a task type
pub fn runner_for(task_type: TaskType, assistant: Arc<dyn CodeAssistant>) -> Arc<dyn StepRunner> {
    match task_type {
        TaskType::SetContext => Arc::new(SetContextStep),
        TaskType::OptimizeCode => Arc::new(OptimizeCodeStep::new(assistant)),
        TaskType::AddUnitTests => Arc::new(GenerateArtifactStep::unit_tests(assistant)),
        TaskType::AddE2eTests => Arc::new(GenerateArtifactStep::e2e_tests(assistant)),
        TaskType::AddInlineDocs => Arc::new(GenerateArtifactStep::inline_docs(assistant)),
        TaskType::AddReadmeDocs => Arc::new(GenerateArtifactStep::readme_docs(assistant)),
        TaskType::RequestApproval => Arc::new(ApprovalGateStep),
        TaskType::SaveResults => Arc::new(SaveResultsStep),
    }
}

/// Register a runner for every task type
pub fn register_all(registry: &mut StepRegistry, assistant: Arc<dyn CodeAssistant>) {
    for task_type in TaskType::ALL {
        registry.register(runner_for(task_type, assistant.clone()));
    }
    debug_assert!(registry.is_complete());
}

/// The code a step works on: its wired `Code` input when present, falling
/// back to the run-wide code slot
pub(crate) fn effective_code(scope: &NodeScope<'_>) -> Option<String> {
    scope
        .input("Code")
        .or(scope.code())
        .as_str()
        .map(str::to_string)
}
