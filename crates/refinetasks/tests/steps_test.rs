use refinecore::{
    approval_slots, ArtifactKind, NodeSpec, PhaseId, RunEnvironment, StepOutcome, TaskType, Value,
};
use refineruntime::{MemoryStore, StepRunner, Storage};
use refinetasks::{
    AnnotatingAssistant, ApprovalGateStep, OptimizeCodeStep, SaveResultsStep, SetContextStep,
};
use std::sync::Arc;
use uuid::Uuid;

fn phase_id() -> PhaseId {
    Uuid::new_v4()
}

#[tokio::test]
async fn set_context_seeds_run_wide_code() {
    let node = NodeSpec::new(TaskType::SetContext).with_input("Code", "fn main() {}");
    let store = MemoryStore::new();
    let mut env = RunEnvironment::new(Uuid::new_v4());
    let pid = phase_id();
    env.wire_inputs(&node, &[], pid);

    let outcome = SetContextStep
        .run(&mut env.scope(node.id, pid), &store, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(outcome, StepOutcome::Succeeded);
    assert_eq!(env.code().as_str(), Some("fn main() {}"));
    assert_eq!(env.starting_code().as_str(), Some("fn main() {}"));
    assert_eq!(
        env.slots_of(node.id).outputs.get("Code"),
        Some(&Value::String("fn main() {}".into()))
    );
}

#[tokio::test]
async fn set_context_fails_without_any_code() {
    let node = NodeSpec::new(TaskType::SetContext);
    let store = MemoryStore::new();
    let mut env = RunEnvironment::new(Uuid::new_v4());
    let pid = phase_id();
    env.wire_inputs(&node, &[], pid);

    let outcome = SetContextStep
        .run(&mut env.scope(node.id, pid), &store, Uuid::new_v4())
        .await
        .unwrap();

    assert!(matches!(outcome, StepOutcome::Failed(_)));
}

#[tokio::test]
async fn optimize_rewrites_through_the_assistant() {
    let node = NodeSpec::new(TaskType::OptimizeCode)
        .with_input("Code", "let x = 1;")
        .with_input("Instructions", "inline everything");
    let store = MemoryStore::new();
    let mut env = RunEnvironment::new(Uuid::new_v4());
    let pid = phase_id();
    env.wire_inputs(&node, &[], pid);

    let step = OptimizeCodeStep::new(Arc::new(AnnotatingAssistant));
    let outcome = step
        .run(&mut env.scope(node.id, pid), &store, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(outcome, StepOutcome::Succeeded);
    assert_eq!(env.code().as_str(), Some("// inline everything\nlet x = 1;"));
}

#[tokio::test]
async fn optimize_falls_back_to_run_wide_code() {
    let node = NodeSpec::new(TaskType::OptimizeCode);
    let store = MemoryStore::new();
    let mut env = RunEnvironment::new(Uuid::new_v4());
    env.set_code("let x = 1;");
    let pid = phase_id();
    env.wire_inputs(&node, &[], pid);

    let step = OptimizeCodeStep::new(Arc::new(AnnotatingAssistant));
    let outcome = step
        .run(&mut env.scope(node.id, pid), &store, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(outcome, StepOutcome::Succeeded);
    assert_eq!(
        env.code().as_str(),
        Some("// optimize this code for readability and performance\nlet x = 1;")
    );
}

#[tokio::test]
async fn approval_gate_freezes_the_code_pair() {
    let node = NodeSpec::new(TaskType::RequestApproval);
    let store = MemoryStore::new();
    let component_id = Uuid::new_v4();
    let mut env = RunEnvironment::new(component_id);
    env.set_starting_code("original");
    env.set_code("candidate");
    let pid = phase_id();

    let outcome = ApprovalGateStep
        .run(&mut env.scope(node.id, pid), &store, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(outcome, StepOutcome::Suspended);
    let temp = env.slots_of(node.id).temp;
    assert_eq!(
        temp.get(approval_slots::ORIGINAL_CODE),
        Some(&Value::String("original".into()))
    );
    assert_eq!(
        temp.get(approval_slots::PENDING_CODE),
        Some(&Value::String("candidate".into()))
    );
    // downstream readers see the candidate; the original survives in temp
    assert_eq!(env.code().as_str(), Some("candidate"));
}

#[tokio::test]
async fn approval_gate_fails_without_a_code_pair() {
    let node = NodeSpec::new(TaskType::RequestApproval);
    let store = MemoryStore::new();
    let mut env = RunEnvironment::new(Uuid::new_v4());
    env.set_code("candidate only");
    let pid = phase_id();

    let outcome = ApprovalGateStep
        .run(&mut env.scope(node.id, pid), &store, Uuid::new_v4())
        .await
        .unwrap();

    assert!(matches!(outcome, StepOutcome::Failed(_)));
}

#[tokio::test]
async fn save_results_writes_code_and_artifacts() {
    let node = NodeSpec::new(TaskType::SaveResults);
    let store = MemoryStore::new();
    let component_id = Uuid::new_v4();
    let mut env = RunEnvironment::new(component_id);
    env.set_code("final code");
    env.set_artifact(ArtifactKind::UnitTests, "some tests");
    let pid = phase_id();

    let outcome = SaveResultsStep
        .run(&mut env.scope(node.id, pid), &store, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(outcome, StepOutcome::Succeeded);
    let component = store.component(component_id).await.unwrap().unwrap();
    assert_eq!(component.code.as_str(), Some("final code"));
    assert_eq!(
        component.generated.get(&ArtifactKind::UnitTests),
        Some(&Value::String("some tests".into()))
    );
    assert!(!component.generated.contains_key(&ArtifactKind::ReadmeDocs));
}

#[tokio::test]
async fn save_results_fails_with_nothing_to_save() {
    let node = NodeSpec::new(TaskType::SaveResults);
    let store = MemoryStore::new();
    let component_id = Uuid::new_v4();
    let mut env = RunEnvironment::new(component_id);
    let pid = phase_id();

    let outcome = SaveResultsStep
        .run(&mut env.scope(node.id, pid), &store, Uuid::new_v4())
        .await
        .unwrap();

    assert!(matches!(outcome, StepOutcome::Failed(_)));
    assert!(store.component(component_id).await.unwrap().is_none());
}
