//! Property tests for the execution-order resolver: determinism,
//! idempotence and complete, unique numbering over arbitrary graphs.

use proptest::prelude::*;

use flowgraph_engine::graph::{resolve_execution_order, DISCONNECTED};
use flowgraph_engine::strategy::{Edge, EventKind, Node, NodeKind};

// An arbitrary graph: some event roots, some action blocks, and random
// forward flow edges (loop-free so the shape mirrors runnable strategies).
fn arbitrary_graph() -> impl Strategy<Value = (Vec<Node>, Vec<Edge>)> {
    (1usize..10, 0usize..3, proptest::collection::vec((0usize..12, 0usize..12), 0..24)).prop_map(
        |(action_count, event_count, raw_edges)| {
            let mut nodes = Vec::new();
            for i in 0..event_count {
                let event = match i % 3 {
                    0 => EventKind::Tick,
                    1 => EventKind::Timer,
                    _ => EventKind::Trade,
                };
                nodes.push(Node::event(format!("ev{i}"), event));
            }
            for i in 0..action_count {
                nodes.push(Node::new(format!("n{i}"), NodeKind::Action));
            }

            let edges = raw_edges
                .into_iter()
                .enumerate()
                .filter_map(|(i, (from, to))| {
                    let from = from % nodes.len();
                    let to = to % nodes.len();
                    // Forward edges only, and never into an event root
                    if from >= to || nodes[to].is_event() {
                        return None;
                    }
                    Some(Edge::new(
                        format!("e{i}"),
                        nodes[from].id.clone(),
                        "flow",
                        nodes[to].id.clone(),
                        "flow",
                    ))
                })
                .collect();

            (nodes, edges)
        },
    )
}

proptest! {
    #[test]
    fn resolver_is_deterministic_and_idempotent((nodes, edges) in arbitrary_graph()) {
        let first = resolve_execution_order(&nodes, &edges);
        let second = resolve_execution_order(&nodes, &edges);
        prop_assert_eq!(&first, &second);
    }

    #[test]
    fn every_node_gets_a_unique_block_number((nodes, edges) in arbitrary_graph()) {
        let map = resolve_execution_order(&nodes, &edges);
        prop_assert_eq!(map.len(), nodes.len());

        let mut numbers: Vec<u32> = map.values().map(|i| i.block_number).collect();
        numbers.sort_unstable();
        let len_before = numbers.len();
        numbers.dedup();
        prop_assert_eq!(numbers.len(), len_before);

        // Numbering is dense from 1
        prop_assert_eq!(*numbers.first().unwrap(), 1);
        prop_assert_eq!(*numbers.last().unwrap(), nodes.len() as u32);
    }

    #[test]
    fn disconnected_nodes_trail_reachable_ones((nodes, edges) in arbitrary_graph()) {
        let map = resolve_execution_order(&nodes, &edges);
        let has_events = nodes.iter().any(|n| n.is_event());
        prop_assume!(has_events);

        let max_reachable = map
            .values()
            .filter(|i| i.event_context != DISCONNECTED)
            .map(|i| i.block_number)
            .max();
        let min_disconnected = map
            .values()
            .filter(|i| i.event_context == DISCONNECTED)
            .map(|i| i.block_number)
            .min();

        if let (Some(reachable), Some(disconnected)) = (max_reachable, min_disconnected) {
            prop_assert!(disconnected > reachable);
        }
    }
}
