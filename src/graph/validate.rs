// src/graph/validate.rs
// Structural validation: fatal graph errors and non-fatal wiring warnings

use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, Warning};
use crate::graph::order::{resolve_execution_order, DISCONNECTED};
use crate::strategy::{Edge, Node, NodeKind, PortKind};

/// Outcome of graph validation. `errors` block the run; `warnings` and
/// `info` ride along on the result.
#[derive(Debug, Clone, Default)]
pub struct GraphValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<Warning>,
    pub info: Vec<String>,
}

impl GraphValidation {
    pub fn is_runnable(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Fatal-only view of [`validate_graph`], used by the run entry points.
pub fn check_structure(nodes: &[Node], edges: &[Edge]) -> Result<(), EngineError> {
    let validation = validate_graph(nodes, edges);
    match validation.errors.into_iter().next() {
        Some(reason) => Err(EngineError::structural(reason)),
        None => Ok(()),
    }
}

/// Validate the node/edge set.
///
/// Errors: dangling or unknown ports, type-incompatible edges, multiple
/// writers into one non-flow input, flow cycles outside loop constructs.
/// Warnings: event nodes that execute nothing, nodes that will never
/// execute. The graph stays runnable on warnings alone.
pub fn validate_graph(nodes: &[Node], edges: &[Edge]) -> GraphValidation {
    let mut result = GraphValidation::default();
    let nodes_by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    // Edge endpoint and port-kind checks
    let mut writers: HashMap<(String, String), u32> = HashMap::new();
    for edge in edges {
        let source = match nodes_by_id.get(edge.source_node_id.as_str()) {
            Some(n) => *n,
            None => {
                result
                    .errors
                    .push(format!("edge {} references missing node {}", edge.id, edge.source_node_id));
                continue;
            }
        };
        let target = match nodes_by_id.get(edge.target_node_id.as_str()) {
            Some(n) => *n,
            None => {
                result
                    .errors
                    .push(format!("edge {} references missing node {}", edge.id, edge.target_node_id));
                continue;
            }
        };

        let source_kind = source.kind.output_port_kind(&edge.source_port_id);
        let target_kind = target.kind.input_port_kind(&edge.target_port_id);

        let (source_kind, target_kind) = match (source_kind, target_kind) {
            (Some(s), Some(t)) => (s, t),
            (None, _) => {
                result.errors.push(format!(
                    "node {} has no output port '{}'",
                    source.id, edge.source_port_id
                ));
                continue;
            }
            (_, None) => {
                result.errors.push(format!(
                    "node {} has no input port '{}'",
                    target.id, edge.target_port_id
                ));
                continue;
            }
        };

        if !PortKind::compatible(source_kind, target_kind) {
            result.errors.push(format!(
                "edge {} connects incompatible ports: {}.{} ({:?}) -> {}.{} ({:?})",
                edge.id,
                source.id,
                edge.source_port_id,
                source_kind,
                target.id,
                edge.target_port_id,
                target_kind
            ));
            continue;
        }

        // Non-flow inputs accept exactly one writer
        if target_kind != PortKind::Flow {
            let count = writers
                .entry((target.id.clone(), edge.target_port_id.clone()))
                .or_insert(0);
            *count += 1;
            if *count == 2 {
                result.errors.push(format!(
                    "input {}.{} has multiple writers",
                    target.id, edge.target_port_id
                ));
            }
        }
    }

    // Flow cycles are only legal through loop constructs
    for cycle in find_flow_cycles(nodes, edges) {
        let has_loop = cycle
            .iter()
            .any(|id| nodes_by_id.get(id.as_str()).map(|n| n.kind) == Some(NodeKind::Loop));
        if !has_loop {
            result
                .errors
                .push(format!("flow cycle outside a loop construct: {}", cycle.join(" -> ")));
        }
    }

    // Wiring warnings
    let execution_map = resolve_execution_order(nodes, edges);
    let has_events = nodes.iter().any(|n| n.is_event());
    for node in nodes {
        if node.is_event() {
            let outgoing: Vec<&Edge> = edges
                .iter()
                .filter(|e| {
                    e.source_node_id == node.id
                        && node.kind.output_port_kind(&e.source_port_id) == Some(PortKind::Flow)
                })
                .collect();
            if outgoing.is_empty() {
                result.warnings.push(Warning::pre_run(format!(
                    "event '{}' has no connected blocks and will not execute anything",
                    event_label(node)
                )));
            } else if outgoing.len() > 1 {
                result.info.push(format!(
                    "event '{}' has {} branches; each executes independently",
                    event_label(node),
                    outgoing.len()
                ));
            }
        } else if has_events {
            let info = &execution_map[&node.id];
            if info.event_context == DISCONNECTED && !node.kind.is_pure_value() {
                result.warnings.push(Warning::pre_run(format!(
                    "block '{}' has no path from any event and will not execute",
                    node.id
                )));
            }
        }
    }

    result
}

fn event_label(node: &Node) -> String {
    node.event
        .map(|e| e.label().to_string())
        .unwrap_or_else(|| node.id.clone())
}

/// Find cycles in the flow-edge subgraph via DFS back-edge extraction.
fn find_flow_cycles(nodes: &[Node], edges: &[Edge]) -> Vec<Vec<String>> {
    let nodes_by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        let is_flow = nodes_by_id
            .get(edge.source_node_id.as_str())
            .and_then(|n| n.kind.output_port_kind(&edge.source_port_id))
            == Some(PortKind::Flow);
        if is_flow && nodes_by_id.contains_key(edge.target_node_id.as_str()) {
            adjacency
                .entry(edge.source_node_id.as_str())
                .or_default()
                .push(edge.target_node_id.as_str());
        }
    }

    let mut cycles: Vec<Vec<String>> = Vec::new();
    let mut done: HashSet<&str> = HashSet::new();

    for node in nodes {
        if done.contains(node.id.as_str()) {
            continue;
        }
        let mut stack: Vec<&str> = Vec::new();
        let mut on_stack: HashSet<&str> = HashSet::new();
        dfs_cycles(
            node.id.as_str(),
            &adjacency,
            &mut stack,
            &mut on_stack,
            &mut done,
            &mut cycles,
        );
    }

    cycles
}

fn dfs_cycles<'a>(
    current: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    stack: &mut Vec<&'a str>,
    on_stack: &mut HashSet<&'a str>,
    done: &mut HashSet<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    if done.contains(current) {
        return;
    }
    stack.push(current);
    on_stack.insert(current);

    for &next in adjacency.get(current).map(Vec::as_slice).unwrap_or(&[]) {
        if on_stack.contains(next) {
            // Back edge: the cycle is the stack suffix starting at `next`
            let start = stack.iter().position(|&id| id == next).unwrap_or(0);
            cycles.push(stack[start..].iter().map(|s| s.to_string()).collect());
        } else if !done.contains(next) {
            dfs_cycles(next, adjacency, stack, on_stack, done, cycles);
        }
    }

    stack.pop();
    on_stack.remove(current);
    done.insert(current);
}
