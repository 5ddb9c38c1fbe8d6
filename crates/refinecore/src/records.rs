use crate::workflow::{ComponentId, NodeSpec, UserId, Workflow, WorkflowId};
use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type ExecutionId = Uuid;
pub type PhaseId = Uuid;

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    WaitingForApproval,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Lifecycle of one phase row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Created,
    Pending,
    Running,
    Completed,
    Failed,
    WaitingForApproval,
}

/// One run of a compiled plan against a concrete code artifact.
///
/// Created when a run is requested, mutated only by the coordinator,
/// terminal once Completed or Failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub component_id: ComponentId,
    pub user_id: UserId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub credits_consumed: u32,
    /// Snapshot of the definition this run executes
    pub definition: Workflow,
}

impl Execution {
    pub fn new(
        workflow_id: WorkflowId,
        component_id: ComponentId,
        user_id: UserId,
        definition: Workflow,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            component_id,
            user_id,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            credits_consumed: 0,
            definition,
        }
    }
}

/// Per-node, per-run materialization of a workflow node.
///
/// One row per node per execution; created at run start, mutated only by
/// the phase runner, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub id: PhaseId,
    pub execution_id: ExecutionId,
    /// Position in the flattened plan order
    pub number: usize,
    pub node: NodeSpec,
    pub status: PhaseStatus,
    pub inputs: HashMap<String, Value>,
    pub outputs: HashMap<String, Value>,
    pub temp: HashMap<String, Value>,
    pub credits_cost: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseRecord {
    pub fn new(execution_id: ExecutionId, number: usize, node: NodeSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            number,
            node,
            status: PhaseStatus::Created,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            temp: HashMap::new(),
            credits_cost: 0,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Severity of an execution log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Immutable log line attached to exactly one phase record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub phase_id: PhaseId,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(phase_id: PhaseId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            phase_id,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of one step runner invocation.
///
/// Explicit three-way result: suspension is its own variant so it can never
/// be mistaken for success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
    /// The step froze its state and wants the whole run suspended pending
    /// an external approval decision
    Suspended,
}

/// External decision that resumes a suspended execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// Temp-slot keys the approval gate stashes and the resume path reads back.
/// These are the only values that must survive a suspension.
pub mod approval_slots {
    pub const ORIGINAL_CODE: &str = "original_code";
    pub const PENDING_CODE: &str = "pending_code";
}
