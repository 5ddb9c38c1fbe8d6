//! Workflow execution engine
//!
//! This crate turns a user-drawn graph into an ordered execution plan and
//! runs it one phase at a time: wiring inputs, metering credits, invoking
//! step runners, and suspending/resuming around human approval.

mod compiler;
mod coordinator;
mod engine;
mod ledger;
mod phase;
mod step;
mod storage;

pub use compiler::compile;
pub use coordinator::PassOutcome;
pub use engine::{Engine, EngineConfig, RunReport};
pub use ledger::{CreditLedger, MemoryLedger};
pub use phase::PhaseResult;
pub use step::{StepRegistry, StepRunner};
pub use storage::{ComponentArtifacts, MemoryStore, Storage};
