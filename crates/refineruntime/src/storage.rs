use async_trait::async_trait;
use chrono::{DateTime, Utc};
use refinecore::{
    ArtifactKind, ComponentId, Execution, ExecutionId, ExecutionStatus, LogEntry, PhaseId,
    PhaseRecord, StorageError, Value, Workflow, WorkflowId,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Code artifact a workflow runs against, with its generated companions
#[derive(Debug, Clone, Default)]
pub struct ComponentArtifacts {
    pub code: Value,
    pub generated: HashMap<ArtifactKind, Value>,
}

/// Row-level persistence for executions, phases and logs.
///
/// Operations that must change several rows together are single methods, so
/// implementations own the all-or-nothing guarantee.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn upsert_workflow(&self, workflow: Workflow) -> Result<(), StorageError>;

    async fn workflow(&self, id: WorkflowId) -> Result<Workflow, StorageError>;

    async fn insert_execution(&self, execution: Execution) -> Result<(), StorageError>;

    async fn execution(&self, id: ExecutionId) -> Result<Execution, StorageError>;

    async fn set_execution_status(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
    ) -> Result<(), StorageError>;

    /// Record credits spent so far without finalizing (used when parking)
    async fn add_execution_credits(&self, id: ExecutionId, amount: u32)
        -> Result<(), StorageError>;

    /// Terminal execution status plus workflow last-run fields, one commit
    async fn finalize_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        credits_consumed: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    async fn insert_phases(&self, phases: Vec<PhaseRecord>) -> Result<(), StorageError>;

    /// Phase rows of one execution, in plan order
    async fn phases(&self, execution_id: ExecutionId) -> Result<Vec<PhaseRecord>, StorageError>;

    /// Non-terminal transition (e.g. Pending -> Running)
    async fn update_phase(&self, phase: PhaseRecord) -> Result<(), StorageError>;

    /// Terminal phase status, slots and buffered log flush, one commit
    async fn finalize_phase(
        &self,
        phase: PhaseRecord,
        logs: Vec<LogEntry>,
    ) -> Result<(), StorageError>;

    /// Park a run: phase and execution both WaitingForApproval, one commit
    async fn suspend(&self, phase: PhaseRecord, logs: Vec<LogEntry>) -> Result<(), StorageError>;

    async fn logs(&self, phase_id: PhaseId) -> Result<Vec<LogEntry>, StorageError>;

    /// Target of the save-results step
    async fn update_component(
        &self,
        component_id: ComponentId,
        artifacts: ComponentArtifacts,
    ) -> Result<(), StorageError>;

    async fn component(
        &self,
        component_id: ComponentId,
    ) -> Result<Option<ComponentArtifacts>, StorageError>;
}

#[derive(Default)]
struct MemoryInner {
    workflows: HashMap<WorkflowId, Workflow>,
    executions: HashMap<ExecutionId, Execution>,
    phases: HashMap<ExecutionId, Vec<PhaseRecord>>,
    logs: HashMap<PhaseId, Vec<LogEntry>>,
    components: HashMap<ComponentId, ComponentArtifacts>,
}

impl MemoryInner {
    fn phase_slot(
        &mut self,
        execution_id: ExecutionId,
        phase_id: PhaseId,
    ) -> Result<&mut PhaseRecord, StorageError> {
        self.phases
            .get_mut(&execution_id)
            .and_then(|rows| rows.iter_mut().find(|p| p.id == phase_id))
            .ok_or_else(|| StorageError::NotFound(format!("phase {phase_id}")))
    }
}

/// In-process store. A single lock guards all tables, which makes the
/// multi-row commit methods trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn upsert_workflow(&self, workflow: Workflow) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .workflows
            .insert(workflow.id, workflow);
        Ok(())
    }

    async fn workflow(&self, id: WorkflowId) -> Result<Workflow, StorageError> {
        self.inner
            .read()
            .await
            .workflows
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("workflow {id}")))
    }

    async fn insert_execution(&self, execution: Execution) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .executions
            .insert(execution.id, execution);
        Ok(())
    }

    async fn execution(&self, id: ExecutionId) -> Result<Execution, StorageError> {
        self.inner
            .read()
            .await
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("execution {id}")))
    }

    async fn set_execution_status(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("execution {id}")))?;
        execution.status = status;
        Ok(())
    }

    async fn add_execution_credits(
        &self,
        id: ExecutionId,
        amount: u32,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("execution {id}")))?;
        execution.credits_consumed += amount;
        Ok(())
    }

    async fn finalize_execution(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        credits_consumed: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let execution = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("execution {id}")))?;
        execution.status = status;
        execution.completed_at = Some(completed_at);
        execution.credits_consumed += credits_consumed;
        let workflow_id = execution.workflow_id;

        if let Some(workflow) = inner.workflows.get_mut(&workflow_id) {
            workflow.last_run_status = Some(status);
            workflow.last_run_at = Some(completed_at);
        }
        Ok(())
    }

    async fn insert_phases(&self, phases: Vec<PhaseRecord>) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        for phase in phases {
            inner.phases.entry(phase.execution_id).or_default().push(phase);
        }
        Ok(())
    }

    async fn phases(&self, execution_id: ExecutionId) -> Result<Vec<PhaseRecord>, StorageError> {
        let mut rows = self
            .inner
            .read()
            .await
            .phases
            .get(&execution_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|p| p.number);
        Ok(rows)
    }

    async fn update_phase(&self, phase: PhaseRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let execution_id = phase.execution_id;
        let phase_id = phase.id;
        *inner.phase_slot(execution_id, phase_id)? = phase;
        Ok(())
    }

    async fn finalize_phase(
        &self,
        phase: PhaseRecord,
        logs: Vec<LogEntry>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let execution_id = phase.execution_id;
        let phase_id = phase.id;
        *inner.phase_slot(execution_id, phase_id)? = phase;
        inner.logs.entry(phase_id).or_default().extend(logs);
        Ok(())
    }

    async fn suspend(&self, phase: PhaseRecord, logs: Vec<LogEntry>) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let execution_id = phase.execution_id;
        let phase_id = phase.id;
        *inner.phase_slot(execution_id, phase_id)? = phase;
        inner.logs.entry(phase_id).or_default().extend(logs);
        let execution = inner
            .executions
            .get_mut(&execution_id)
            .ok_or_else(|| StorageError::NotFound(format!("execution {execution_id}")))?;
        execution.status = ExecutionStatus::WaitingForApproval;
        Ok(())
    }

    async fn logs(&self, phase_id: PhaseId) -> Result<Vec<LogEntry>, StorageError> {
        Ok(self
            .inner
            .read()
            .await
            .logs
            .get(&phase_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_component(
        &self,
        component_id: ComponentId,
        artifacts: ComponentArtifacts,
    ) -> Result<(), StorageError> {
        self.inner
            .write()
            .await
            .components
            .insert(component_id, artifacts);
        Ok(())
    }

    async fn component(
        &self,
        component_id: ComponentId,
    ) -> Result<Option<ComponentArtifacts>, StorageError> {
        Ok(self.inner.read().await.components.get(&component_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinecore::{LogLevel, NodeSpec, PhaseStatus, TaskType};
    use uuid::Uuid;

    #[tokio::test]
    async fn update_phase_replaces_the_stored_row() {
        let store = MemoryStore::new();
        let execution_id = Uuid::new_v4();
        let phase = PhaseRecord::new(execution_id, 0, NodeSpec::new(TaskType::OptimizeCode));
        store.insert_phases(vec![phase.clone()]).await.unwrap();

        let mut running = phase;
        running.status = PhaseStatus::Running;
        store.update_phase(running).await.unwrap();

        let rows = store.phases(execution_id).await.unwrap();
        assert_eq!(rows[0].status, PhaseStatus::Running);
    }

    #[tokio::test]
    async fn finalize_phase_commits_row_and_logs_together() {
        let store = MemoryStore::new();
        let execution_id = Uuid::new_v4();
        let phase = PhaseRecord::new(execution_id, 0, NodeSpec::new(TaskType::SaveResults));
        let phase_id = phase.id;
        store.insert_phases(vec![phase.clone()]).await.unwrap();

        let mut done = phase;
        done.status = PhaseStatus::Completed;
        let log = LogEntry::new(phase_id, LogLevel::Info, "saved");
        store.finalize_phase(done, vec![log]).await.unwrap();

        let rows = store.phases(execution_id).await.unwrap();
        assert_eq!(rows[0].status, PhaseStatus::Completed);
        let logs = store.logs(phase_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "saved");
    }

    #[tokio::test]
    async fn finalizing_an_unknown_phase_is_not_found() {
        let store = MemoryStore::new();
        let phase = PhaseRecord::new(Uuid::new_v4(), 0, NodeSpec::new(TaskType::SetContext));
        let err = store.finalize_phase(phase, vec![]).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
