// src/graph/order.rs
// Deterministic block-number assignment per event root

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::strategy::{Edge, Node, PortKind};

/// Event context tag for nodes unreachable from any event root.
pub const DISCONNECTED: &str = "disconnected";

/// Derived execution-order annotation for one node.
///
/// Recomputed on demand from the node/edge set; never persisted as source of
/// truth. Block numbers are the user-visible execution-order contract and the
/// tie-break rule during interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionInfo {
    pub node_id: String,
    /// Unique per graph snapshot, assigned from 1 upward.
    pub block_number: u32,
    pub execution_order: u32,
    pub depth: u32,
    pub branch: u32,
    pub event_context: String,
}

struct QueueEntry {
    node_id: String,
    depth: u32,
    branch: u32,
}

fn is_flow_edge(nodes_by_id: &HashMap<&str, &Node>, edge: &Edge) -> bool {
    nodes_by_id
        .get(edge.source_node_id.as_str())
        .and_then(|n| n.kind.output_port_kind(&edge.source_port_id))
        == Some(PortKind::Flow)
}

/// Assign a block number to every node.
///
/// Breadth-first traversal over outgoing flow edges, one pass per event node
/// in declaration order. The first visit wins: a node reachable from two
/// event roots keeps its first-assigned number and event context. Without any
/// event node the graph is treated as flat and numbered by declaration order.
/// Nodes never reached trail behind all reachable nodes under the
/// [`DISCONNECTED`] context.
///
/// Pure and re-entrant: identical input always yields identical output.
pub fn resolve_execution_order(nodes: &[Node], edges: &[Edge]) -> BTreeMap<String, ExecutionInfo> {
    let mut execution_map: BTreeMap<String, ExecutionInfo> = BTreeMap::new();
    let nodes_by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let event_nodes: Vec<&Node> = nodes.iter().filter(|n| n.is_event()).collect();

    // Degenerate flat graph: number by declaration order
    if event_nodes.is_empty() {
        for (index, node) in nodes.iter().enumerate() {
            execution_map.insert(
                node.id.clone(),
                ExecutionInfo {
                    node_id: node.id.clone(),
                    block_number: index as u32 + 1,
                    execution_order: index as u32,
                    depth: 0,
                    branch: 0,
                    event_context: "global".to_string(),
                },
            );
        }
        return execution_map;
    }

    let mut global_block_number: u32 = 1;
    let mut visited: HashSet<String> = HashSet::new();

    for (event_index, event_node) in event_nodes.iter().enumerate() {
        let event_context = event_node
            .event
            .map(|e| e.label().to_string())
            .unwrap_or_else(|| "event".to_string());

        if visited.insert(event_node.id.clone()) {
            execution_map.insert(
                event_node.id.clone(),
                ExecutionInfo {
                    node_id: event_node.id.clone(),
                    block_number: global_block_number,
                    execution_order: event_index as u32,
                    depth: 0,
                    branch: 0,
                    event_context: event_context.clone(),
                },
            );
            global_block_number += 1;
        }

        let mut queue: VecDeque<QueueEntry> = VecDeque::new();
        let outgoing: Vec<&Edge> = edges
            .iter()
            .filter(|e| e.source_node_id == event_node.id && is_flow_edge(&nodes_by_id, e))
            .collect();
        for (branch_index, edge) in outgoing.iter().enumerate() {
            queue.push_back(QueueEntry {
                node_id: edge.target_node_id.clone(),
                depth: 1,
                branch: branch_index as u32,
            });
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.node_id.clone()) {
                continue;
            }
            if !nodes_by_id.contains_key(current.node_id.as_str()) {
                continue;
            }

            execution_map.insert(
                current.node_id.clone(),
                ExecutionInfo {
                    node_id: current.node_id.clone(),
                    block_number: global_block_number,
                    execution_order: global_block_number,
                    depth: current.depth,
                    branch: current.branch,
                    event_context: event_context.clone(),
                },
            );
            global_block_number += 1;

            let child_edges: Vec<&Edge> = edges
                .iter()
                .filter(|e| e.source_node_id == current.node_id && is_flow_edge(&nodes_by_id, e))
                .collect();
            let fan_out = child_edges.len();
            for (idx, edge) in child_edges.iter().enumerate() {
                if !visited.contains(edge.target_node_id.as_str()) {
                    queue.push_back(QueueEntry {
                        node_id: edge.target_node_id.clone(),
                        depth: current.depth + 1,
                        branch: if fan_out > 1 { idx as u32 } else { current.branch },
                    });
                }
            }
        }
    }

    // Anything never visited trails behind all reachable nodes
    for node in nodes {
        if !execution_map.contains_key(&node.id) {
            execution_map.insert(
                node.id.clone(),
                ExecutionInfo {
                    node_id: node.id.clone(),
                    block_number: global_block_number,
                    execution_order: 9999,
                    depth: 0,
                    branch: 0,
                    event_context: DISCONNECTED.to_string(),
                },
            );
            global_block_number += 1;
        }
    }

    execution_map
}

/// Node ids sorted by block number.
pub fn execution_order_sorted(execution_map: &BTreeMap<String, ExecutionInfo>) -> Vec<String> {
    let mut entries: Vec<&ExecutionInfo> = execution_map.values().collect();
    entries.sort_by_key(|info| info.block_number);
    entries.iter().map(|info| info.node_id.clone()).collect()
}
