// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for the link protocol.
//!
//! Random sequences of connect, break and delete operations must leave the
//! link tables and every slot cache in agreement.

use passgraph_engine::node::{default_behavior, NodeCategory, NodeRegistry, NodeType};
use passgraph_engine::{Graph, NodeId, Slot, SlotRef};
use proptest::prelude::*;

const NODE_COUNT: usize = 5;

#[derive(Debug, Clone)]
enum Op {
    Connect(usize, usize),
    Break(usize, usize),
    BreakAll(usize),
    Delete(usize),
}

/// Strategy for generating one graph operation over slot/node indices
fn op_strategy() -> impl Strategy<Value = Op> {
    let slot = 0..NODE_COUNT * 4;
    prop_oneof![
        4 => (slot.clone(), slot.clone()).prop_map(|(a, b)| Op::Connect(a, b)),
        2 => (slot.clone(), slot.clone()).prop_map(|(a, b)| Op::Break(a, b)),
        1 => slot.prop_map(Op::BreakAll),
        1 => (0..NODE_COUNT).prop_map(Op::Delete),
    ]
}

/// A pass type with one single and one multi-link input
fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(NodeType {
        id: "PASS".to_string(),
        name: "Pass".to_string(),
        category: NodeCategory::Misc,
        description: String::new(),
        inputs: vec![
            Slot::input("in", "TEXTURE_2D"),
            Slot::input("after", "TASK").accept_many_inputs(),
        ],
        outputs: vec![Slot::output("out", "TEXTURE_2D"), Slot::output("done", "TASK")],
        behavior: default_behavior,
    });
    registry
}

fn build() -> (Graph, Vec<NodeId>, Vec<SlotRef>) {
    let registry = registry();
    let mut graph = Graph::new();
    let root = graph.root();
    let mut nodes = Vec::new();
    let mut slots = Vec::new();
    for i in 0..NODE_COUNT {
        let id = graph.create_node(root, &registry, "PASS", [i as f32 * 100.0, 0.0]).unwrap();
        nodes.push(id);
        for name in ["in", "after", "out", "done"] {
            slots.push(graph.find_slot_by_name(id, name).unwrap());
        }
    }
    (graph, nodes, slots)
}

fn apply(graph: &mut Graph, nodes: &[NodeId], slots: &[SlotRef], op: &Op) {
    match *op {
        Op::Connect(a, b) => {
            graph.connect_slots(slots[a], slots[b]);
        }
        Op::Break(a, b) => {
            graph.break_link_between(slots[a], slots[b]);
        }
        Op::BreakAll(a) => {
            graph.break_all_links_connected_to_slot(slots[a]);
        }
        Op::Delete(n) => {
            let root = graph.root();
            graph.destroy_child_node_if_allowed(root, nodes[n], true);
        }
    }
}

proptest! {
    #[test]
    fn prop_caches_match_link_tables(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let (mut graph, nodes, slots) = build();
        for op in &ops {
            apply(&mut graph, &nodes, &slots, op);
        }
        prop_assert!(graph.check_consistency().is_empty());

        let cached: usize = graph
            .nodes()
            .flat_map(|n| n.outputs())
            .map(|s| s.linked_slots().len())
            .sum();
        prop_assert_eq!(cached, graph.link_count());
    }

    #[test]
    fn prop_links_are_symmetric(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let (mut graph, nodes, slots) = build();
        for op in &ops {
            apply(&mut graph, &nodes, &slots, op);
        }
        for slot in slots.iter().filter(|s| graph.slot(**s).is_some()) {
            for partner in graph.slots_linked_to(*slot) {
                prop_assert!(graph.slots_linked_to(partner).contains(slot));
                prop_assert!(graph.find_link_between(*slot, partner).is_some());
            }
        }
    }

    #[test]
    fn prop_single_inputs_hold_one_link(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let (mut graph, nodes, slots) = build();
        for op in &ops {
            apply(&mut graph, &nodes, &slots, op);
        }
        for node in graph.nodes() {
            for input in node.inputs().filter(|s| !s.accept_many_inputs) {
                prop_assert!(input.linked_slots().len() <= 1);
            }
        }
    }

    #[test]
    fn prop_break_is_idempotent(a in 0..NODE_COUNT * 4, b in 0..NODE_COUNT * 4) {
        let (mut graph, _, slots) = build();
        let linked = graph.connect_slots(slots[a], slots[b]);
        let first = graph.break_link_between(slots[a], slots[b]);
        prop_assert_eq!(first, linked);
        prop_assert!(!graph.break_link_between(slots[a], slots[b]));
        prop_assert_eq!(graph.link_count(), 0);
        prop_assert!(graph.check_consistency().is_empty());
    }

    #[test]
    fn prop_node_and_pin_ids_disjoint(ops in prop::collection::vec(op_strategy(), 0..20)) {
        let (mut graph, nodes, slots) = build();
        for op in &ops {
            apply(&mut graph, &nodes, &slots, op);
        }
        let pin_offset = graph.ids().pin_offset();
        for node in graph.nodes() {
            prop_assert!(node.id().get() < pin_offset);
            for slot in node.slots() {
                prop_assert!(slot.pin_id().get() >= pin_offset);
            }
        }
    }

    #[test]
    fn prop_xml_reload_keeps_structure(ops in prop::collection::vec(op_strategy(), 0..30)) {
        let (mut graph, nodes, slots) = build();
        for op in &ops {
            apply(&mut graph, &nodes, &slots, op);
        }
        let xml = graph.to_xml().unwrap();
        let loaded = Graph::from_xml(&xml, &registry()).unwrap();

        prop_assert_eq!(loaded.node_count(), graph.node_count());
        prop_assert_eq!(loaded.link_count(), graph.link_count());
        prop_assert!(loaded.check_consistency().is_empty());
        prop_assert_eq!(loaded.to_xml().unwrap(), xml);
    }
}
