use async_trait::async_trait;
use refinecore::{
    approval_slots, ApprovalDecision, ArtifactKind, ComponentId, EngineError, ExecutionId,
    ExecutionStatus, NodeScope, NodeSpec, PhaseStatus, StepError, StepOutcome, TaskType, UserId,
    Workflow,
};
use refineruntime::{
    CreditLedger, Engine, EngineConfig, MemoryLedger, MemoryStore, StepRegistry, StepRunner,
    Storage,
};
use refinetasks::AnnotatingAssistant;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const CODE: &str = "fn add(a: i32, b: i32) -> i32 { a + b }";
const OPTIMIZED: &str =
    "// optimize this code for readability and performance\nfn add(a: i32, b: i32) -> i32 { a + b }";

struct Harness {
    engine: Engine,
    store: Arc<MemoryStore>,
    ledger: Arc<MemoryLedger>,
    user_id: UserId,
    component_id: ComponentId,
}

async fn harness(credits: u32) -> Harness {
    harness_with(credits, EngineConfig::default(), |_| {}).await
}

async fn harness_with(
    credits: u32,
    config: EngineConfig,
    customize: impl FnOnce(&mut StepRegistry),
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let mut registry = StepRegistry::new();
    refinetasks::register_all(&mut registry, Arc::new(AnnotatingAssistant));
    customize(&mut registry);

    let user_id = Uuid::new_v4();
    ledger.grant(user_id, credits).await;

    Harness {
        engine: Engine::with_config(store.clone(), ledger.clone(), Arc::new(registry), config),
        store,
        ledger,
        user_id,
        component_id: Uuid::new_v4(),
    }
}

/// context -> optimize -> unit tests -> save
fn pipeline() -> Workflow {
    let mut workflow = Workflow::new("pipeline");
    let context =
        workflow.add_node(NodeSpec::new(TaskType::SetContext).with_input("Code", CODE));
    let optimize = workflow.add_node(NodeSpec::new(TaskType::OptimizeCode));
    let tests = workflow.add_node(NodeSpec::new(TaskType::AddUnitTests));
    let save = workflow.add_node(NodeSpec::new(TaskType::SaveResults));
    workflow.connect(context, "Code", optimize, "Code");
    workflow.connect(optimize, "Code", tests, "Code");
    workflow.connect(tests, "Tests", save, "Results");
    workflow
}

/// context -> optimize -> approval gate -> unit tests -> save
fn gated_pipeline() -> Workflow {
    let mut workflow = Workflow::new("gated-pipeline");
    let context =
        workflow.add_node(NodeSpec::new(TaskType::SetContext).with_input("Code", CODE));
    let optimize = workflow.add_node(NodeSpec::new(TaskType::OptimizeCode));
    let approval = workflow.add_node(NodeSpec::new(TaskType::RequestApproval));
    let tests = workflow.add_node(NodeSpec::new(TaskType::AddUnitTests));
    let save = workflow.add_node(NodeSpec::new(TaskType::SaveResults));
    workflow.connect(context, "Code", optimize, "Code");
    workflow.connect(optimize, "Code", approval, "Code");
    workflow.connect(approval, "Code", tests, "Code");
    workflow.connect(tests, "Tests", save, "Results");
    workflow
}

#[tokio::test]
async fn completed_run_persists_all_rows() {
    let h = harness(20).await;
    let report = h
        .engine
        .start_run(pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.phases_run, 4);
    // 1 (context) + 4 (optimize) + 3 (unit tests) + 1 (save)
    assert_eq!(report.credits_consumed, 9);
    assert_eq!(h.ledger.balance(h.user_id).await.unwrap(), 11);

    let phases = h.store.phases(report.execution_id).await.unwrap();
    assert_eq!(phases.len(), 4);
    for phase in &phases {
        assert_eq!(phase.status, PhaseStatus::Completed);
        assert!(phase.started_at.is_some());
        assert!(phase.completed_at.is_some());
    }
    let costs: Vec<u32> = phases.iter().map(|p| p.credits_cost).collect();
    assert_eq!(costs, vec![1, 4, 3, 1]);

    let execution = h.store.execution(report.execution_id).await.unwrap();
    assert!(execution.completed_at.is_some());

    let workflow = h.store.workflow(execution.workflow_id).await.unwrap();
    assert_eq!(workflow.last_run_status, Some(ExecutionStatus::Completed));
    assert!(workflow.last_run_at.is_some());

    let component = h.store.component(h.component_id).await.unwrap().unwrap();
    assert_eq!(component.code.as_str(), Some(OPTIMIZED));
    assert!(component.generated.contains_key(&ArtifactKind::UnitTests));
}

#[tokio::test]
async fn credit_exhaustion_fails_phase_without_running_it() {
    // enough for the entry phase only; the optimize step costs 4
    let h = harness(1).await;
    let report = h
        .engine
        .start_run(pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);

    let phases = h.store.phases(report.execution_id).await.unwrap();
    assert_eq!(phases[0].status, PhaseStatus::Completed);
    assert_eq!(phases[0].credits_cost, 1);
    assert_eq!(phases[1].status, PhaseStatus::Failed);
    assert_eq!(phases[1].credits_cost, 0);
    // nothing past the failure executed
    assert_eq!(phases[2].status, PhaseStatus::Pending);
    assert_eq!(phases[3].status, PhaseStatus::Pending);

    let logs = h.store.logs(phases[1].id).await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("insufficient credits")));

    let execution = h.store.execution(report.execution_id).await.unwrap();
    assert_eq!(execution.credits_consumed, 1);
    // optimize never ran, so the balance was not touched by it
    assert_eq!(h.ledger.balance(h.user_id).await.unwrap(), 0);
    assert!(h.store.component(h.component_id).await.unwrap().is_none());
}

#[tokio::test]
async fn suspension_parks_the_run_without_finalizing() {
    let h = harness(20).await;
    let report = h
        .engine
        .start_run(gated_pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::WaitingForApproval);
    assert_eq!(report.phases_run, 3);

    let phases = h.store.phases(report.execution_id).await.unwrap();
    let gate = &phases[2];
    assert_eq!(gate.status, PhaseStatus::WaitingForApproval);
    assert_eq!(
        gate.temp.get(approval_slots::ORIGINAL_CODE).and_then(|v| v.as_str()),
        Some(CODE)
    );
    assert_eq!(
        gate.temp.get(approval_slots::PENDING_CODE).and_then(|v| v.as_str()),
        Some(OPTIMIZED)
    );
    // phases after the gate are untouched
    assert_eq!(phases[3].status, PhaseStatus::Pending);
    assert_eq!(phases[4].status, PhaseStatus::Pending);

    // no finalize write happened
    let execution = h.store.execution(report.execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::WaitingForApproval);
    assert!(execution.completed_at.is_none());
    assert_eq!(execution.credits_consumed, 6);

    let workflow = h.store.workflow(execution.workflow_id).await.unwrap();
    assert!(workflow.last_run_status.is_none());
}

#[tokio::test]
async fn approved_resume_continues_with_pending_code() {
    let h = harness(20).await;
    let suspended = h
        .engine
        .start_run(gated_pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();

    let report = h
        .engine
        .resume(suspended.execution_id, ApprovalDecision::Approved)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.credits_consumed, 10);

    let phases = h.store.phases(report.execution_id).await.unwrap();
    let gate = &phases[2];
    assert_eq!(gate.status, PhaseStatus::Completed);
    assert_eq!(gate.outputs.get("Approved").and_then(|v| v.as_bool()), Some(true));
    assert!(phases.iter().all(|p| p.status == PhaseStatus::Completed));

    // the run ends exactly as an ungated run would
    let component = h.store.component(h.component_id).await.unwrap().unwrap();
    assert_eq!(component.code.as_str(), Some(OPTIMIZED));

    let ungated = harness(20).await;
    let baseline = ungated
        .engine
        .start_run(pipeline(), ungated.component_id, ungated.user_id, CODE)
        .await
        .unwrap();
    assert_eq!(baseline.status, report.status);
    let baseline_component = ungated
        .store
        .component(ungated.component_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(baseline_component.code, component.code);
    assert_eq!(
        baseline_component.generated.get(&ArtifactKind::UnitTests),
        component.generated.get(&ArtifactKind::UnitTests)
    );
}

#[tokio::test]
async fn rejected_resume_reverts_to_original_code_and_continues() {
    let h = harness(20).await;
    let suspended = h
        .engine
        .start_run(gated_pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();

    let report = h
        .engine
        .resume(suspended.execution_id, ApprovalDecision::Rejected)
        .await
        .unwrap();

    // rejection is not a failure: the run continues on the original code
    assert_eq!(report.status, ExecutionStatus::Completed);

    let phases = h.store.phases(report.execution_id).await.unwrap();
    let gate = &phases[2];
    assert_eq!(gate.status, PhaseStatus::Completed);
    assert_eq!(gate.outputs.get("Approved").and_then(|v| v.as_bool()), Some(false));

    let component = h.store.component(h.component_id).await.unwrap().unwrap();
    assert_eq!(component.code.as_str(), Some(CODE));
    // downstream steps saw the reverted code
    assert_eq!(
        component
            .generated
            .get(&ArtifactKind::UnitTests)
            .and_then(|v| v.as_str()),
        Some(format!("// write unit tests for this code\n{CODE}").as_str())
    );
}

/// context -> unit tests -> approval gate -> save
fn early_artifact_pipeline() -> Workflow {
    let mut workflow = Workflow::new("early-artifact");
    let context =
        workflow.add_node(NodeSpec::new(TaskType::SetContext).with_input("Code", CODE));
    let tests = workflow.add_node(NodeSpec::new(TaskType::AddUnitTests));
    let approval = workflow.add_node(NodeSpec::new(TaskType::RequestApproval));
    let save = workflow.add_node(NodeSpec::new(TaskType::SaveResults));
    workflow.connect(context, "Code", tests, "Code");
    workflow.connect(tests, "Tests", approval, "Code");
    workflow.connect(approval, "Code", save, "Results");
    workflow
}

#[tokio::test]
async fn artifacts_generated_before_the_gate_survive_resume() {
    let h = harness(20).await;
    let suspended = h
        .engine
        .start_run(early_artifact_pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();
    assert_eq!(suspended.status, ExecutionStatus::WaitingForApproval);

    let report = h
        .engine
        .resume(suspended.execution_id, ApprovalDecision::Approved)
        .await
        .unwrap();
    assert_eq!(report.status, ExecutionStatus::Completed);

    // the artifact produced before the suspension reaches the component
    let component = h.store.component(h.component_id).await.unwrap().unwrap();
    assert_eq!(
        component
            .generated
            .get(&ArtifactKind::UnitTests)
            .and_then(|v| v.as_str()),
        Some(format!("// write unit tests for this code\n{CODE}").as_str())
    );
    assert_eq!(component.code.as_str(), Some(CODE));
}

#[tokio::test]
async fn resume_requires_a_suspended_execution() {
    let h = harness(20).await;
    let report = h
        .engine
        .start_run(pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();

    let err = h
        .engine
        .resume(report.execution_id, ApprovalDecision::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NothingToResume(_)));

    let err = h
        .engine
        .resume(Uuid::new_v4(), ApprovalDecision::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExecutionNotFound(_)));
}

struct FaultyStep;

#[async_trait]
impl StepRunner for FaultyStep {
    fn task_type(&self) -> TaskType {
        TaskType::OptimizeCode
    }

    async fn run(
        &self,
        _scope: &mut NodeScope<'_>,
        _store: &dyn Storage,
        _execution_id: ExecutionId,
    ) -> Result<StepOutcome, StepError> {
        Err(StepError::Assistant("model unavailable".into()))
    }
}

#[tokio::test]
async fn step_fault_becomes_a_phase_failure() {
    let h = harness_with(20, EngineConfig::default(), |registry| {
        registry.register(Arc::new(FaultyStep));
    })
    .await;

    let report = h
        .engine
        .start_run(pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);

    let phases = h.store.phases(report.execution_id).await.unwrap();
    assert_eq!(phases[1].status, PhaseStatus::Failed);
    assert_eq!(phases[2].status, PhaseStatus::Pending);

    let logs = h.store.logs(phases[1].id).await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("model unavailable")));
}

struct StallingStep;

#[async_trait]
impl StepRunner for StallingStep {
    fn task_type(&self) -> TaskType {
        TaskType::OptimizeCode
    }

    async fn run(
        &self,
        _scope: &mut NodeScope<'_>,
        _store: &dyn Storage,
        _execution_id: ExecutionId,
    ) -> Result<StepOutcome, StepError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(StepOutcome::Succeeded)
    }
}

#[tokio::test]
async fn stalled_step_times_out_as_a_failure() {
    let config = EngineConfig {
        step_timeout: Duration::from_millis(50),
    };
    let h = harness_with(20, config, |registry| {
        registry.register(Arc::new(StallingStep));
    })
    .await;

    let report = h
        .engine
        .start_run(pipeline(), h.component_id, h.user_id, CODE)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);

    let phases = h.store.phases(report.execution_id).await.unwrap();
    assert_eq!(phases[1].status, PhaseStatus::Failed);
    let logs = h.store.logs(phases[1].id).await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("timed out")));
}

#[tokio::test]
async fn publish_attaches_a_reusable_plan() {
    let h = harness(20).await;
    let published = h.engine.publish(gated_pipeline()).unwrap();
    let plan = published.plan.clone().unwrap();
    assert_eq!(plan.phases.len(), 5);
    assert_eq!(plan.node_count(), 5);

    // a published workflow runs without recompiling
    let report = h
        .engine
        .start_run(published, h.component_id, h.user_id, CODE)
        .await
        .unwrap();
    assert_eq!(report.status, ExecutionStatus::WaitingForApproval);
}
