use crate::records::{LogEntry, LogLevel, PhaseId, PhaseRecord};
use crate::task::TaskType;
use crate::workflow::{ComponentId, Edge, NodeId, NodeSpec};
use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Run-wide slots for generated artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    UnitTests,
    E2eTests,
    InlineDocs,
    ReadmeDocs,
}

/// Which run-wide artifact slot a task type's named output feeds, if any
fn artifact_output(task_type: TaskType) -> Option<(ArtifactKind, &'static str)> {
    match task_type {
        TaskType::AddUnitTests => Some((ArtifactKind::UnitTests, "Tests")),
        TaskType::AddE2eTests => Some((ArtifactKind::E2eTests, "Tests")),
        TaskType::AddInlineDocs => Some((ArtifactKind::InlineDocs, "Docs")),
        TaskType::AddReadmeDocs => Some((ArtifactKind::ReadmeDocs, "Docs")),
        _ => None,
    }
}

/// Per-node scratch area within a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSlots {
    pub inputs: HashMap<String, Value>,
    pub outputs: HashMap<String, Value>,
    pub temp: HashMap<String, Value>,
}

/// Transient, run-scoped data plane shared by every phase of one execution.
///
/// Exclusively owned by the coordinator pass that drives the run; step
/// runners only ever see a [`NodeScope`] narrowed to their own node. Not
/// persisted directly: it is rebuilt from phase rows on resume and written
/// back slot-by-slot after each node runs.
#[derive(Debug)]
pub struct RunEnvironment {
    component_id: ComponentId,
    code: Value,
    starting_code: Value,
    artifacts: HashMap<ArtifactKind, Value>,
    slots: HashMap<NodeId, NodeSlots>,
    log_buffer: Vec<LogEntry>,
}

impl RunEnvironment {
    pub fn new(component_id: ComponentId) -> Self {
        Self {
            component_id,
            code: Value::Null,
            starting_code: Value::Null,
            artifacts: HashMap::new(),
            slots: HashMap::new(),
            log_buffer: Vec::new(),
        }
    }

    /// Rebuild the per-node slots and the run-wide artifact slots from
    /// persisted phase rows (resume path)
    pub fn restore(component_id: ComponentId, phases: &[PhaseRecord]) -> Self {
        let mut env = Self::new(component_id);
        for phase in phases {
            if let Some((kind, output)) = artifact_output(phase.node.task_type) {
                if let Some(value) = phase.outputs.get(output) {
                    if !value.is_null() {
                        env.artifacts.insert(kind, value.clone());
                    }
                }
            }
            env.slots.insert(
                phase.node.id,
                NodeSlots {
                    inputs: phase.inputs.clone(),
                    outputs: phase.outputs.clone(),
                    temp: phase.temp.clone(),
                },
            );
        }
        env
    }

    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    pub fn code(&self) -> &Value {
        &self.code
    }

    pub fn set_code(&mut self, code: impl Into<Value>) {
        self.code = code.into();
    }

    pub fn starting_code(&self) -> &Value {
        &self.starting_code
    }

    pub fn set_starting_code(&mut self, code: impl Into<Value>) {
        self.starting_code = code.into();
    }

    /// Reading an unset artifact slot yields Null, never an error
    pub fn artifact(&self, kind: ArtifactKind) -> Value {
        self.artifacts.get(&kind).cloned().unwrap_or_default()
    }

    pub fn set_artifact(&mut self, kind: ArtifactKind, value: impl Into<Value>) {
        self.artifacts.insert(kind, value.into());
    }

    /// Populate a node's input slots ahead of execution.
    ///
    /// A literal value on the node wins; otherwise the producing node's
    /// output is copied along the matching edge. A required input with
    /// neither is logged and left null — validation already ran at compile
    /// time, so this is a backstop, not a control-flow decision.
    pub fn wire_inputs(&mut self, node: &NodeSpec, edges: &[Edge], phase_id: PhaseId) {
        let descriptor = node.task_type.descriptor();
        let mut wired = HashMap::new();

        for decl in descriptor.inputs {
            if let Some(literal) = node.inputs.get(decl.name) {
                wired.insert(decl.name.to_string(), literal.clone());
                continue;
            }

            let incoming = edges
                .iter()
                .find(|e| e.to_node == node.id && e.to_input == decl.name);
            if let Some(edge) = incoming {
                let value = self
                    .slots
                    .get(&edge.from_node)
                    .and_then(|s| s.outputs.get(&edge.from_output))
                    .cloned()
                    .unwrap_or_default();
                wired.insert(decl.name.to_string(), value);
                continue;
            }

            if decl.required {
                tracing::warn!(
                    node = %node.label(),
                    input = decl.name,
                    "required input has no literal and no incoming edge"
                );
                self.log_buffer.push(LogEntry::new(
                    phase_id,
                    LogLevel::Error,
                    format!("no value available for required input '{}'", decl.name),
                ));
            }
            wired.insert(decl.name.to_string(), Value::Null);
        }

        self.slots.entry(node.id).or_default().inputs = wired;
    }

    /// Snapshot a node's slots for persistence into its phase row
    pub fn slots_of(&self, node_id: NodeId) -> NodeSlots {
        self.slots.get(&node_id).cloned().unwrap_or_default()
    }

    /// Drain the log lines buffered since the last flush
    pub fn take_logs(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.log_buffer)
    }

    /// Narrow view for one step runner invocation
    pub fn scope(&mut self, node_id: NodeId, phase_id: PhaseId) -> NodeScope<'_> {
        NodeScope {
            env: self,
            node_id,
            phase_id,
        }
    }
}

/// Read/write view scoped to a single node's slots plus the run-wide fields.
///
/// Step runners receive this instead of the raw environment so one node
/// cannot reach into another node's scratch space.
pub struct NodeScope<'a> {
    env: &'a mut RunEnvironment,
    node_id: NodeId,
    phase_id: PhaseId,
}

impl NodeScope<'_> {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn component_id(&self) -> ComponentId {
        self.env.component_id
    }

    pub fn input(&self, name: &str) -> Value {
        self.env
            .slots
            .get(&self.node_id)
            .and_then(|s| s.inputs.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Convenience for text ports
    pub fn text_input(&self, name: &str) -> Option<String> {
        self.input(name).as_str().map(str::to_string)
    }

    pub fn set_output(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.env
            .slots
            .entry(self.node_id)
            .or_default()
            .outputs
            .insert(name.into(), value.into());
    }

    pub fn temp(&self, name: &str) -> Value {
        self.env
            .slots
            .get(&self.node_id)
            .and_then(|s| s.temp.get(name))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_temp(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.env
            .slots
            .entry(self.node_id)
            .or_default()
            .temp
            .insert(name.into(), value.into());
    }

    pub fn code(&self) -> Value {
        self.env.code.clone()
    }

    pub fn set_code(&mut self, code: impl Into<Value>) {
        self.env.set_code(code);
    }

    pub fn starting_code(&self) -> Value {
        self.env.starting_code.clone()
    }

    pub fn set_starting_code(&mut self, code: impl Into<Value>) {
        self.env.set_starting_code(code);
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Value {
        self.env.artifact(kind)
    }

    pub fn set_artifact(&mut self, kind: ArtifactKind, value: impl Into<Value>) {
        self.env.set_artifact(kind, value);
    }

    /// Append a log line to this phase's buffer
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.env
            .log_buffer
            .push(LogEntry::new(self.phase_id, level, message));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}
