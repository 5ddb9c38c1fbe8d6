use crate::compiler::compile;
use crate::coordinator::Coordinator;
use crate::ledger::CreditLedger;
use crate::step::StepRegistry;
use crate::storage::Storage;
use chrono::Utc;
use refinecore::{
    approval_slots, ApprovalDecision, ComponentId, EngineError, Execution, ExecutionId,
    ExecutionStatus, LogEntry, LogLevel, PhaseRecord, PhaseStatus, Result, RunEnvironment,
    UserId, Value, Workflow,
};
use std::sync::Arc;
use std::time::Duration;

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A step runner that never returns stalls the run, so every
    /// invocation is bounded
    pub step_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(120),
        }
    }
}

/// What a run (or a resumption) left behind
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub credits_consumed: u32,
    pub phases_run: usize,
}

/// Entry point to the execution engine: compiles plans, starts runs and
/// resumes suspended ones.
pub struct Engine {
    store: Arc<dyn Storage>,
    ledger: Arc<dyn CreditLedger>,
    registry: Arc<StepRegistry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Storage>,
        ledger: Arc<dyn CreditLedger>,
        registry: Arc<StepRegistry>,
    ) -> Self {
        Self::with_config(store, ledger, registry, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn Storage>,
        ledger: Arc<dyn CreditLedger>,
        registry: Arc<StepRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            registry,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// Compile the workflow and attach the plan for reuse by future runs.
    /// Pure apart from the attachment; nothing is persisted on error.
    pub fn publish(&self, mut workflow: Workflow) -> Result<Workflow> {
        let plan = compile(&workflow.nodes, &workflow.edges)?;
        workflow.plan = Some(plan);
        Ok(workflow)
    }

    /// Run a workflow against a component's code artifact.
    ///
    /// Reuses the published plan when present, otherwise compiles ad hoc.
    /// Creates the execution and phase rows, then drives the coordinator;
    /// returns once the run is terminal or parked awaiting approval.
    pub async fn start_run(
        &self,
        workflow: Workflow,
        component_id: ComponentId,
        user_id: UserId,
        starting_code: impl Into<Value>,
    ) -> Result<RunReport> {
        let mut workflow = workflow;
        let plan = match workflow.plan.clone() {
            Some(plan) => plan,
            None => compile(&workflow.nodes, &workflow.edges)?,
        };
        workflow.plan = Some(plan.clone());
        self.store.upsert_workflow(workflow.clone()).await?;

        let execution = Execution::new(workflow.id, component_id, user_id, workflow.clone());
        let execution_id = execution.id;
        self.store.insert_execution(execution).await?;

        let mut records = Vec::with_capacity(plan.node_count());
        for (number, node) in plan.flatten().into_iter().enumerate() {
            let mut record = PhaseRecord::new(execution_id, number, node.clone());
            record.status = PhaseStatus::Pending;
            records.push(record);
        }
        self.store.insert_phases(records.clone()).await?;

        let mut env = RunEnvironment::new(component_id);
        let code = starting_code.into();
        env.set_starting_code(code.clone());
        env.set_code(code);

        tracing::info!(%execution_id, workflow = %workflow.name, "starting run");
        let pass = self
            .coordinator()
            .run(&mut env, execution_id, records, &workflow.edges, user_id)
            .await?;

        self.report(execution_id, pass.phases_run).await
    }

    /// Resume a suspended execution with the external approval decision.
    ///
    /// The execution id is the resume token: at most one phase per
    /// execution awaits approval. Concurrent decisions for one execution
    /// must be serialized by the caller.
    pub async fn resume(
        &self,
        execution_id: ExecutionId,
        decision: ApprovalDecision,
    ) -> Result<RunReport> {
        let execution = self
            .store
            .execution(execution_id)
            .await
            .map_err(|_| EngineError::ExecutionNotFound(execution_id))?;
        if execution.status != ExecutionStatus::WaitingForApproval {
            return Err(EngineError::NothingToResume(execution_id));
        }

        let phases = self.store.phases(execution_id).await?;
        let waiting = phases
            .iter()
            .find(|p| p.status == PhaseStatus::WaitingForApproval)
            .ok_or(EngineError::NothingToResume(execution_id))?
            .clone();

        // recover the frozen pair from the gate's temp slots
        let original = waiting
            .temp
            .get(approval_slots::ORIGINAL_CODE)
            .cloned()
            .unwrap_or_default();
        let pending = waiting
            .temp
            .get(approval_slots::PENDING_CODE)
            .cloned()
            .unwrap_or_default();

        let mut env = RunEnvironment::restore(execution.component_id, &phases);
        env.set_starting_code(original.clone());
        let (chosen, note) = match decision {
            ApprovalDecision::Approved => (pending, "change approved, keeping pending code"),
            ApprovalDecision::Rejected => (original, "change rejected, reverting to original code"),
        };
        env.set_code(chosen);
        tracing::info!(%execution_id, ?decision, "resuming suspended run");

        // re-admit the gate phase as completed and unpark the execution
        let mut gate = waiting;
        {
            let mut scope = env.scope(gate.node.id, gate.id);
            scope.set_output("Approved", decision == ApprovalDecision::Approved);
            let code = scope.code();
            scope.set_output("Code", code);
        }
        gate.outputs = env.slots_of(gate.node.id).outputs;
        gate.status = PhaseStatus::Completed;
        gate.completed_at = Some(Utc::now());
        let gate_log = LogEntry::new(gate.id, LogLevel::Info, note);
        self.store.finalize_phase(gate, vec![gate_log]).await?;
        self.store
            .set_execution_status(execution_id, ExecutionStatus::Running)
            .await?;

        let remaining: Vec<PhaseRecord> = phases
            .into_iter()
            .filter(|p| p.status == PhaseStatus::Pending)
            .collect();
        let pass = self
            .coordinator()
            .run(
                &mut env,
                execution_id,
                remaining,
                &execution.definition.edges,
                execution.user_id,
            )
            .await?;

        self.report(execution_id, pass.phases_run).await
    }

    fn coordinator(&self) -> Coordinator<'_> {
        Coordinator {
            store: self.store.as_ref(),
            ledger: self.ledger.as_ref(),
            registry: self.registry.as_ref(),
            step_timeout: self.config.step_timeout,
        }
    }

    async fn report(&self, execution_id: ExecutionId, phases_run: usize) -> Result<RunReport> {
        let execution = self.store.execution(execution_id).await?;
        Ok(RunReport {
            execution_id,
            status: execution.status,
            credits_consumed: execution.credits_consumed,
            phases_run,
        })
    }
}
