use crate::records::ExecutionId;
use crate::task::TaskType;
use crate::workflow::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("step error: {0}")]
    Step(#[from] StepError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("execution {0} has no phase awaiting approval")]
    NothingToResume(ExecutionId),

    #[error("no step runner registered for task type {0}")]
    NoRunner(TaskType),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A rejected workflow graph. Returned whole; nothing is persisted on error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("workflow has no entry-point node")]
    NoEntryPoint,

    #[error("workflow has more than one entry-point node")]
    MultipleEntryPoints,

    #[error("cyclic dependency detected")]
    CycleDetected,

    #[error("unsatisfied required inputs on {0:?}")]
    InvalidInputs(Vec<InputViolation>),
}

/// One node whose required inputs have neither a literal nor a
/// satisfying edge. The compiler collects every violation, not just the
/// first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputViolation {
    pub node_id: NodeId,
    pub inputs: Vec<String>,
}

/// Unexpected fault inside a step runner. Caught at the phase-runner
/// boundary and converted into a normal phase failure plus a log entry.
#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error("assistant call failed: {0}")]
    Assistant(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}
