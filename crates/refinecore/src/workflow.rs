use crate::records::ExecutionStatus;
use crate::task::TaskType;
use crate::plan::ExecutionPlan;
use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = Uuid;
pub type ComponentId = Uuid;
pub type UserId = Uuid;

/// User-authored workflow definition: a directed graph of transformation steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<Edge>,
    /// Compiled plan, attached at publish time so runs skip recompilation
    pub plan: Option<ExecutionPlan>,
    pub last_run_status: Option<ExecutionStatus>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            plan: None,
            last_run_status: None,
            last_run_at: None,
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Wire a producing node's output to a consuming node's input
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_output: impl Into<String>,
        to_node: NodeId,
        to_input: impl Into<String>,
    ) {
        self.edges.push(Edge {
            from_node,
            from_output: from_output.into(),
            to_node,
            to_input: to_input.into(),
        });
    }

    pub fn find_node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// One step in a workflow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub task_type: TaskType,
    pub name: Option<String>,
    /// Literal input values supplied by the user in the editor
    pub inputs: HashMap<String, Value>,
    /// Editor placement only; irrelevant to execution
    pub position: Option<Position>,
}

impl NodeSpec {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            name: None,
            inputs: HashMap::new(),
            position: None,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    /// Display label: user-given name or the task tag
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.task_type.tag().to_string())
    }
}

/// Directed data dependency between two nodes' ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from_node: NodeId,
    pub from_output: String,
    pub to_node: NodeId,
    pub to_input: String,
}

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
