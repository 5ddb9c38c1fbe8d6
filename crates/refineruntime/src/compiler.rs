use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use refinecore::{
    CompileError, Edge, ExecutionPlan, InputViolation, NodeId, NodeSpec, PlanPhase,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Compile a user-drawn graph into an ordered, dependency-respecting plan.
///
/// Returns the phase-ordered plan, or the full set of validation failures.
/// Nothing is persisted on error.
pub fn compile(nodes: &[NodeSpec], edges: &[Edge]) -> Result<ExecutionPlan, CompileError> {
    let entry = find_entry_point(nodes)?;

    let node_ids: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();

    // Dependency map over edges whose endpoints both exist. Dangling edges
    // are ignored here; the inputs they fail to satisfy are reported below.
    let mut deps: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in edges {
        if !node_ids.contains(&edge.from_node) || !node_ids.contains(&edge.to_node) {
            continue;
        }
        let entry = deps.entry(edge.to_node).or_default();
        if !entry.contains(&edge.from_node) {
            entry.push(edge.from_node);
        }
    }

    check_acyclic(nodes, &deps)?;

    // Dependency depth: memoized longest path from the roots
    let mut depths: HashMap<NodeId, usize> = HashMap::new();
    for node in nodes {
        depth_of(node.id, &deps, &mut depths);
    }

    // The entry node always opens the plan; remaining nodes group by depth,
    // joining a phase only once every dependency is already planned
    let mut by_depth: BTreeMap<usize, Vec<&NodeSpec>> = BTreeMap::new();
    for node in nodes {
        if node.id == entry.id {
            continue;
        }
        by_depth.entry(depths[&node.id]).or_default().push(node);
    }

    let mut violations: Vec<InputViolation> = Vec::new();
    let mut planned: HashSet<NodeId> = HashSet::new();

    validate_inputs(entry, edges, &planned, &mut violations);
    let mut phases = vec![PlanPhase {
        nodes: vec![entry.clone()],
    }];
    planned.insert(entry.id);

    let mut deferred: Vec<&NodeSpec> = Vec::new();
    for (_, group) in by_depth {
        let mut candidates = std::mem::take(&mut deferred);
        candidates.extend(group);

        let (ready, rest): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|n| {
            deps.get(&n.id)
                .map(|d| d.iter().all(|dep| planned.contains(dep)))
                .unwrap_or(true)
        });
        deferred = rest;

        if ready.is_empty() {
            continue;
        }
        for node in &ready {
            validate_inputs(node, edges, &planned, &mut violations);
        }
        planned.extend(ready.iter().map(|n| n.id));
        phases.push(PlanPhase {
            nodes: ready.into_iter().cloned().collect(),
        });
    }

    // Acyclicity guarantees every deferred node eventually became ready
    debug_assert!(deferred.is_empty());

    if violations.is_empty() {
        Ok(ExecutionPlan { phases })
    } else {
        Err(CompileError::InvalidInputs(violations))
    }
}

fn find_entry_point(nodes: &[NodeSpec]) -> Result<&NodeSpec, CompileError> {
    let mut entries = nodes
        .iter()
        .filter(|n| n.task_type.descriptor().entry_point);
    let first = entries.next().ok_or(CompileError::NoEntryPoint)?;
    if entries.next().is_some() {
        return Err(CompileError::MultipleEntryPoints);
    }
    Ok(first)
}

/// A cycle would make the depth recursion loop forever, so reject it first
fn check_acyclic(nodes: &[NodeSpec], deps: &HashMap<NodeId, Vec<NodeId>>) -> Result<(), CompileError> {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut indices = HashMap::new();
    for node in nodes {
        indices.insert(node.id, graph.add_node(node.id));
    }
    for (target, sources) in deps {
        for source in sources {
            graph.add_edge(indices[source], indices[target], ());
        }
    }
    if toposort(&graph, None).is_err() {
        return Err(CompileError::CycleDetected);
    }
    Ok(())
}

fn depth_of(
    id: NodeId,
    deps: &HashMap<NodeId, Vec<NodeId>>,
    memo: &mut HashMap<NodeId, usize>,
) -> usize {
    if let Some(&d) = memo.get(&id) {
        return d;
    }
    let depth = match deps.get(&id) {
        None => 0,
        Some(sources) if sources.is_empty() => 0,
        Some(sources) => {
            1 + sources
                .iter()
                .map(|&s| depth_of(s, deps, memo))
                .max()
                .unwrap_or(0)
        }
    };
    memo.insert(id, depth);
    depth
}

/// A required input is satisfied by a literal on the node or by an edge
/// from an already-planned node's output. Every unmet input is collected.
fn validate_inputs(
    node: &NodeSpec,
    edges: &[Edge],
    planned: &HashSet<NodeId>,
    violations: &mut Vec<InputViolation>,
) {
    let mut unmet = Vec::new();
    for decl in node.task_type.descriptor().inputs {
        if !decl.required {
            continue;
        }
        if node.inputs.contains_key(decl.name) {
            continue;
        }
        let satisfied = edges.iter().any(|e| {
            e.to_node == node.id && e.to_input == decl.name && planned.contains(&e.from_node)
        });
        if !satisfied {
            unmet.push(decl.name.to_string());
        }
    }
    if !unmet.is_empty() {
        violations.push(InputViolation {
            node_id: node.id,
            inputs: unmet,
        });
    }
}
