//! Core types for the refine engine
//!
//! This crate provides the definition, plan and record types that every
//! other component depends on. It has no runtime machinery.

mod environment;
mod error;
mod plan;
mod records;
mod task;
mod value;
mod workflow;

pub use environment::{ArtifactKind, NodeScope, NodeSlots, RunEnvironment};
pub use error::{CompileError, EngineError, InputViolation, StepError, StorageError};
pub use plan::{ExecutionPlan, PlanPhase};
pub use records::{
    approval_slots, ApprovalDecision, Execution, ExecutionId, ExecutionStatus, LogEntry, LogLevel,
    PhaseId, PhaseRecord, PhaseStatus, StepOutcome,
};
pub use task::{InputDecl, OutputDecl, PortKind, TaskDescriptor, TaskType};
pub use value::Value;
pub use workflow::{ComponentId, Edge, NodeId, NodeSpec, Position, UserId, Workflow, WorkflowId};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
