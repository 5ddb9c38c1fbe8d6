use crate::workflow::NodeSpec;
use serde::{Deserialize, Serialize};

/// Ordered sequence of plan phases produced by the flow compiler.
///
/// Invariants: every reachable node appears in exactly one phase, no edge
/// connects two nodes of the same phase, and every node's dependencies live
/// in strictly earlier phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub phases: Vec<PlanPhase>,
}

impl ExecutionPlan {
    /// Flatten the plan into the order the coordinator walks it
    pub fn flatten(&self) -> Vec<&NodeSpec> {
        self.phases.iter().flat_map(|p| p.nodes.iter()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.phases.iter().map(|p| p.nodes.len()).sum()
    }
}

/// A group of mutually independent nodes whose dependencies are all
/// satisfied by earlier phases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub nodes: Vec<NodeSpec>,
}
