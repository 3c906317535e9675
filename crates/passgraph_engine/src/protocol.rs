// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection protocol: creating and breaking links between slots.
//!
//! The link table of the container node is the authority on what is
//! connected. Every mutation goes through [`Graph::connect_slots`] or
//! [`Graph::break_link`], which keep the pin index and the slot caches in
//! step with it.

use crate::graph::Graph;
use crate::id::{LinkId, NodeId, PinId};
use crate::link::Link;
use crate::slot::{SlotPlace, SlotRef};
use thiserror::Error;

/// Drift between the link tables, their indexes and the slot caches
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyIssue {
    /// A link endpoint does not resolve to a live slot
    #[error("link {link} points at missing slot {slot}")]
    DanglingEndpoint {
        /// Link
        link: LinkId,
        /// Unresolved endpoint
        slot: SlotRef,
    },

    /// A link exists but a slot does not cache its partner
    #[error("slot {slot} does not cache its link partner {partner}")]
    MissingCacheEntry {
        /// Slot
        slot: SlotRef,
        /// Partner from the link table
        partner: SlotRef,
    },

    /// A slot caches a partner with no matching link
    #[error("slot {slot} caches {partner} without a link")]
    StaleCacheEntry {
        /// Slot
        slot: SlotRef,
        /// Cached partner
        partner: SlotRef,
    },

    /// The connected flag disagrees with the cached partners
    #[error("slot {slot} connected flag does not match its partners")]
    ConnectedFlagMismatch {
        /// Slot
        slot: SlotRef,
    },

    /// The pin index and the link table disagree
    #[error("link {link} and the index of pin {pin} disagree")]
    IndexMismatch {
        /// Link
        link: LinkId,
        /// Pin
        pin: PinId,
    },

    /// A single-input slot holds more than one link
    #[error("input slot {slot} holds {count} links")]
    CardinalityExceeded {
        /// Slot
        slot: SlotRef,
        /// Number of links
        count: usize,
    },

    /// The link owner map and the link tables disagree
    #[error("link {link} has no matching owner entry")]
    OrphanLinkOwner {
        /// Link
        link: LinkId,
    },
}

impl Graph {
    /// Graph node holding the links between two nodes: their shared parent
    pub fn common_container(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let pa = self.node(a)?.parent()?;
        let pb = self.node(b)?.parent()?;
        (pa == pb).then_some(pa)
    }

    fn link_container(&self, slot: SlotRef) -> Option<NodeId> {
        self.node(slot.node)?.parent()
    }

    /// Ask the node owning `to` whether it accepts a link with `from`
    pub fn can_connect(&self, to: SlotRef, from: SlotRef) -> bool {
        let (Some(to_info), Some(from_info)) = (self.slot_info(to), self.slot_info(from)) else {
            return false;
        };
        self.node(to.node)
            .is_some_and(|n| n.behavior().can_connect_slots(&to_info, &from_info))
    }

    /// Link two slots, in either order.
    ///
    /// Returns `false` without side effects when the pair is rejected.
    /// Linking an already linked pair is a no-op returning `true`. A
    /// single-input slot drops its current link before taking the new one.
    pub fn connect_slots(&mut self, from: SlotRef, to: SlotRef) -> bool {
        let (Some(mut from_info), Some(mut to_info)) = (self.slot_info(from), self.slot_info(to)) else {
            tracing::warn!("cannot connect {} to {}: slot not found", from, to);
            return false;
        };

        if from_info.place == SlotPlace::Input && to_info.place == SlotPlace::Output {
            std::mem::swap(&mut from_info, &mut to_info);
        }

        let Some(container) = self.common_container(from_info.slot.node, to_info.slot.node) else {
            tracing::info!(
                "connection refused: {} and {} are not in the same graph",
                from_info.slot,
                to_info.slot
            );
            return false;
        };

        if !self.can_connect(to_info.slot, from_info.slot) {
            tracing::info!(
                "connection refused: {} '{}' [{} {}] -> {} '{}' [{} {}]",
                from_info.slot,
                from_info.name,
                from_info.place,
                from_info.slot_type,
                to_info.slot,
                to_info.name,
                to_info.place,
                to_info.slot_type
            );
            return false;
        }

        let (output, input) = match (from_info.place, to_info.place) {
            (SlotPlace::Output, SlotPlace::Input) => (from_info, to_info),
            _ => {
                tracing::info!(
                    "connection refused: {} and {} are not an output/input pair",
                    from_info.slot,
                    to_info.slot
                );
                return false;
            }
        };

        let already_linked = self
            .node(container)
            .is_some_and(|n| n.links().link_between(input.slot, output.slot).is_some());
        if already_linked {
            return true;
        }

        let Some(id) = self.ids.next_link_id() else {
            tracing::warn!("cannot link {} -> {}: link id range exhausted", output.slot, input.slot);
            return false;
        };

        if !input.accept_many_inputs && self.slot(input.slot).is_some_and(|s| s.is_connected()) {
            self.break_all_links_connected_to_slot(input.slot);
        }

        let link = Link::new(id, input.slot, output.slot);
        let Some(container_node) = self.nodes.get_mut(&container) else {
            return false;
        };
        container_node.links.insert(link);
        self.link_owners.insert(id, container);
        if let Some(slot) = self.slot_mut(input.slot) {
            slot.add_connected_slot(output.slot);
        }
        if let Some(slot) = self.slot_mut(output.slot) {
            slot.add_connected_slot(input.slot);
        }
        tracing::debug!("link {} created: {} -> {}", id, output.slot, input.slot);

        self.notify_connection_change(output.slot, true);
        self.notify_connection_change(input.slot, true);
        if let Some(node) = self.nodes.get_mut(&output.slot.node) {
            node.behavior.on_connect(&output, &input);
        }
        if let Some(node) = self.nodes.get_mut(&input.slot.node) {
            node.behavior.on_connect(&input, &output);
        }
        true
    }

    /// Break a link by id.
    ///
    /// A missing link, or one whose endpoint vanished, is logged and left
    /// untouched; the call then returns `false`.
    pub fn break_link(&mut self, id: LinkId) -> bool {
        let Some(container) = self.link_owners.get(&id).copied() else {
            tracing::warn!("cannot break link {}: not found", id);
            return false;
        };
        let Some(link) = self.node(container).and_then(|n| n.links().get(id)).copied() else {
            tracing::warn!("link {} is registered in {} but missing from its table", id, container);
            return false;
        };
        let (Some(input), Some(output)) = (self.slot_info(link.input), self.slot_info(link.output)) else {
            tracing::warn!(
                "cannot break link {}: endpoint {} or {} vanished",
                id,
                link.input,
                link.output
            );
            return false;
        };

        if let Some(slot) = self.slot_mut(input.slot) {
            slot.remove_connected_slot(output.slot);
        }
        if let Some(slot) = self.slot_mut(output.slot) {
            slot.remove_connected_slot(input.slot);
        }
        if let Some(node) = self.nodes.get_mut(&container) {
            node.links.remove(id);
        }
        self.link_owners.remove(&id);
        tracing::debug!("link {} removed: {} -> {}", id, output.slot, input.slot);

        if let Some(node) = self.nodes.get_mut(&output.slot.node) {
            node.behavior.on_disconnect(&output, &input);
        }
        if let Some(node) = self.nodes.get_mut(&input.slot.node) {
            node.behavior.on_disconnect(&input, &output);
        }
        self.notify_connection_change(output.slot, false);
        self.notify_connection_change(input.slot, false);
        true
    }

    /// Break the link joining two slots, in either order
    pub fn break_link_between(&mut self, a: SlotRef, b: SlotRef) -> bool {
        match self.find_link_between(a, b) {
            Some(id) => self.break_link(id),
            None => false,
        }
    }

    /// Break every link touching a slot; `true` when all of them went
    pub fn break_all_links_connected_to_slot(&mut self, slot: SlotRef) -> bool {
        let ids = self.links_of_slot(slot);
        let mut all = true;
        for id in ids {
            all &= self.break_link(id);
        }
        all
    }

    /// Link joining two slots
    pub fn find_link_between(&self, a: SlotRef, b: SlotRef) -> Option<LinkId> {
        let container = self.common_container(a.node, b.node)?;
        self.node(container)?.links().link_between(a, b).map(|l| l.id)
    }

    /// Get a link by id
    pub fn find_link(&self, id: LinkId) -> Option<&Link> {
        let container = self.link_owners.get(&id)?;
        self.node(*container)?.links().get(id)
    }

    /// Ids of the links touching a slot
    pub fn links_of_slot(&self, slot: SlotRef) -> Vec<LinkId> {
        let Some(container) = self.link_container(slot) else {
            return Vec::new();
        };
        self.node(container)
            .map(|n| n.links().ids_for_pin(slot.pin))
            .unwrap_or_default()
    }

    /// Partner slots of a slot, read from the link table
    pub fn slots_linked_to(&self, slot: SlotRef) -> Vec<SlotRef> {
        self.links_of_slot(slot)
            .into_iter()
            .filter_map(|id| self.find_link(id))
            .filter_map(|link| link.other_end(slot))
            .collect()
    }

    /// Tell the owning node that a slot's connection state changed
    pub fn notify_connection_change(&mut self, slot: SlotRef, connected: bool) {
        let Some(info) = self.slot_info(slot) else {
            return;
        };
        self.set_changed(slot.node);
        if let Some(node) = self.nodes.get_mut(&slot.node) {
            node.behavior.on_connection_change(&info, connected);
        }
    }

    /// Compare every link table against its index, the slot caches and
    /// the owner map. An empty result means the engine is consistent.
    pub fn check_consistency(&self) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();

        for container in self.nodes() {
            let table = container.links();
            for link in table.iter() {
                for end in [link.input, link.output] {
                    if self.slot(end).is_none() {
                        issues.push(ConsistencyIssue::DanglingEndpoint { link: link.id, slot: end });
                    }
                    if !table.index_bucket(end.pin).is_some_and(|b| b.contains(&link.id)) {
                        issues.push(ConsistencyIssue::IndexMismatch { link: link.id, pin: end.pin });
                    }
                }
                if self.link_owners.get(&link.id) != Some(&container.id()) {
                    issues.push(ConsistencyIssue::OrphanLinkOwner { link: link.id });
                }
            }
            for (pin, bucket) in table.index() {
                for id in bucket {
                    if !table.get(*id).is_some_and(|l| l.involves_pin(pin)) {
                        issues.push(ConsistencyIssue::IndexMismatch { link: *id, pin });
                    }
                }
            }
        }

        for (link, owner) in &self.link_owners {
            if !self.node(*owner).is_some_and(|n| n.links().contains(*link)) {
                issues.push(ConsistencyIssue::OrphanLinkOwner { link: *link });
            }
        }

        for node in self.nodes() {
            for slot in node.slots() {
                let Some(slot_ref) = slot.slot_ref() else {
                    continue;
                };
                let mut expected = self.slots_linked_to(slot_ref);
                for cached in slot.linked_slots() {
                    match expected.iter().position(|p| p == cached) {
                        Some(pos) => {
                            expected.swap_remove(pos);
                        }
                        None => issues.push(ConsistencyIssue::StaleCacheEntry {
                            slot: slot_ref,
                            partner: *cached,
                        }),
                    }
                }
                for partner in expected {
                    issues.push(ConsistencyIssue::MissingCacheEntry { slot: slot_ref, partner });
                }
                if slot.is_connected() == slot.linked_slots().is_empty() {
                    issues.push(ConsistencyIssue::ConnectedFlagMismatch { slot: slot_ref });
                }
                let count = slot.linked_slots().len();
                if slot.is_input() && !slot.accept_many_inputs && count > 1 {
                    issues.push(ConsistencyIssue::CardinalityExceeded { slot: slot_ref, count });
                }
            }
        }

        for issue in &issues {
            tracing::warn!("consistency: {}", issue);
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeBehavior};
    use crate::slot::{Slot, SlotInfo};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl NodeBehavior for Recorder {
        fn on_connection_change(&mut self, slot: &SlotInfo, connected: bool) {
            self.events.borrow_mut().push(format!("change {} {}", slot.name, connected));
        }

        fn on_connect(&mut self, own: &SlotInfo, _other: &SlotInfo) {
            self.events.borrow_mut().push(format!("connect {}", own.name));
        }

        fn on_disconnect(&mut self, own: &SlotInfo, _other: &SlotInfo) {
            self.events.borrow_mut().push(format!("disconnect {}", own.name));
        }
    }

    #[derive(Debug)]
    struct RejectAll;

    impl NodeBehavior for RejectAll {
        fn can_connect_slots(&self, _own: &SlotInfo, _other: &SlotInfo) -> bool {
            false
        }
    }

    fn producer(graph: &mut Graph, name: &str, slot_type: &str) -> SlotRef {
        let root = graph.root();
        let id = graph
            .add_node(root, Node::new(name, "SRC").with_output(Slot::output("tex", slot_type)), true)
            .unwrap();
        graph.find_slot_by_name(id, "tex").unwrap()
    }

    fn consumer(graph: &mut Graph, name: &str, slot: Slot) -> SlotRef {
        let root = graph.root();
        let id = graph.add_node(root, Node::new(name, "DST").with_input(slot), true).unwrap();
        graph.find_slot_by_name(id, "tex").unwrap()
    }

    #[test]
    fn test_connect_and_break() {
        let mut graph = Graph::new();
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let b = consumer(&mut graph, "B", Slot::input("tex", "TEXTURE_2D"));

        // Input first: orientation is normalised
        assert!(graph.connect_slots(b, a));
        assert!(graph.slot(a).unwrap().is_connected());
        assert!(graph.slot(b).unwrap().is_connected());
        assert_eq!(graph.slot(a).unwrap().linked_slots(), &[b]);
        assert_eq!(graph.slot(b).unwrap().linked_slots(), &[a]);
        assert_eq!(graph.link_count(), 1);

        let link = graph.find_link(graph.links_of_slot(a)[0]).copied().unwrap();
        assert_eq!(link.output, a);
        assert_eq!(link.input, b);

        assert!(graph.break_link_between(a, b));
        assert!(!graph.slot(a).unwrap().is_connected());
        assert!(!graph.slot(b).unwrap().is_connected());
        assert_eq!(graph.link_count(), 0);
        assert!(graph.check_consistency().is_empty());
    }

    #[test]
    fn test_rejections_have_no_side_effects() {
        let mut graph = Graph::new();
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let mesh = producer(&mut graph, "M", "MESH");
        let b = consumer(&mut graph, "B", Slot::input("tex", "TEXTURE_2D"));
        let c = consumer(&mut graph, "C", Slot::input("tex", "TEXTURE_2D"));

        assert!(!graph.connect_slots(mesh, b));
        assert!(!graph.connect_slots(a, mesh));
        assert!(!graph.connect_slots(b, c));
        assert!(!graph.connect_slots(a, a));
        assert_eq!(graph.link_count(), 0);
        assert!(!graph.slot(b).unwrap().is_connected());
    }

    #[test]
    fn test_same_node_rejected() {
        let mut graph = Graph::new();
        let root = graph.root();
        let id = graph
            .add_node(
                root,
                Node::new("Loop", "X")
                    .with_input(Slot::input("in", "TEXTURE_2D"))
                    .with_output(Slot::output("out", "TEXTURE_2D")),
                true,
            )
            .unwrap();
        let i = graph.find_slot_by_name(id, "in").unwrap();
        let o = graph.find_slot_by_name(id, "out").unwrap();
        assert!(!graph.connect_slots(o, i));
    }

    #[test]
    fn test_custom_policy() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let id = graph
            .add_node(
                root,
                Node::new("Picky", "X")
                    .with_input(Slot::input("tex", "TEXTURE_2D"))
                    .with_behavior(Box::new(RejectAll)),
                true,
            )
            .unwrap();
        let b = graph.find_slot_by_name(id, "tex").unwrap();
        assert!(!graph.can_connect(b, a));
        assert!(!graph.connect_slots(a, b));
    }

    #[test]
    fn test_cross_container_rejected() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let sub = graph.add_node(root, Node::graph("Sub"), true).unwrap();
        let inner = graph
            .add_node(sub, Node::new("B", "DST").with_input(Slot::input("tex", "TEXTURE_2D")), true)
            .unwrap();
        let b = graph.find_slot_by_name(inner, "tex").unwrap();
        assert!(!graph.connect_slots(a, b));
    }

    #[test]
    fn test_single_input_cardinality() {
        let mut graph = Graph::new();
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let c = producer(&mut graph, "C", "TEXTURE_2D");
        let b = consumer(&mut graph, "B", Slot::input("tex", "TEXTURE_2D"));

        assert!(graph.connect_slots(b, a));
        assert!(graph.connect_slots(b, c));
        assert_eq!(graph.slot(b).unwrap().linked_slots(), &[c]);
        assert!(!graph.slot(a).unwrap().is_connected());
        assert!(graph.find_link_between(a, b).is_none());
        assert!(graph.find_link_between(c, b).is_some());
        assert_eq!(graph.link_count(), 1);
    }

    #[test]
    fn test_accept_many_inputs() {
        let mut graph = Graph::new();
        let a = producer(&mut graph, "A", "LIGHT_GROUP");
        let c = producer(&mut graph, "C", "LIGHT_GROUP");
        let b = consumer(&mut graph, "B", Slot::input("tex", "LIGHT_GROUP").accept_many_inputs());

        assert!(graph.connect_slots(a, b));
        assert!(graph.connect_slots(c, b));
        assert_eq!(graph.slot(b).unwrap().linked_slots().len(), 2);
        assert_eq!(graph.slots_linked_to(b), vec![a, c]);

        assert!(graph.break_all_links_connected_to_slot(b));
        assert!(!graph.slot(b).unwrap().is_connected());
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn test_duplicate_connect_is_noop() {
        let mut graph = Graph::new();
        let a = producer(&mut graph, "A", "LIGHT_GROUP");
        let b = consumer(&mut graph, "B", Slot::input("tex", "LIGHT_GROUP").accept_many_inputs());
        assert!(graph.connect_slots(a, b));
        assert!(graph.connect_slots(b, a));
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.slot(b).unwrap().linked_slots().len(), 1);
    }

    #[test]
    fn test_break_twice() {
        let mut graph = Graph::new();
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let b = consumer(&mut graph, "B", Slot::input("tex", "TEXTURE_2D"));
        assert!(graph.connect_slots(a, b));
        let id = graph.find_link_between(a, b).unwrap();

        assert!(graph.break_link(id));
        assert!(!graph.break_link(id));
        assert!(!graph.break_link_between(a, b));
        assert!(!graph.slot(a).unwrap().is_connected());
        assert!(graph.check_consistency().is_empty());
    }

    #[test]
    fn test_callback_order() {
        let mut graph = Graph::new();
        let root = graph.root();
        let events = Rc::new(RefCell::new(Vec::new()));
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let id = graph
            .add_node(
                root,
                Node::new("B", "DST")
                    .with_input(Slot::input("tex", "TEXTURE_2D"))
                    .with_behavior(Box::new(Recorder {
                        events: Rc::clone(&events),
                    })),
                true,
            )
            .unwrap();
        let b = graph.find_slot_by_name(id, "tex").unwrap();

        assert!(graph.connect_slots(a, b));
        assert!(graph.break_link_between(a, b));
        assert_eq!(
            *events.borrow(),
            vec![
                "change tex true".to_string(),
                "connect tex".to_string(),
                "disconnect tex".to_string(),
                "change tex false".to_string(),
            ]
        );
    }

    #[test]
    fn test_consistency_detects_drift() {
        let mut graph = Graph::new();
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let b = consumer(&mut graph, "B", Slot::input("tex", "TEXTURE_2D"));
        assert!(graph.connect_slots(a, b));

        // Forge a stale cache entry behind the protocol's back
        let ghost = SlotRef::new(NodeId(1), PinId(2));
        graph.slot_mut(b).unwrap().add_connected_slot(ghost);
        let issues = graph.check_consistency();
        assert!(issues.contains(&ConsistencyIssue::StaleCacheEntry { slot: b, partner: ghost }));
        assert!(issues.contains(&ConsistencyIssue::CardinalityExceeded { slot: b, count: 2 }));
    }

    #[test]
    fn test_break_with_vanished_endpoint() {
        let mut graph = Graph::new();
        let a = producer(&mut graph, "A", "TEXTURE_2D");
        let b = consumer(&mut graph, "B", Slot::input("tex", "TEXTURE_2D"));
        assert!(graph.connect_slots(a, b));
        let id = graph.find_link_between(a, b).unwrap();

        // Drop the producer slot without going through the protocol
        graph.node_mut(a.node).unwrap().outputs.remove(&a.pin);
        assert!(!graph.break_link(id));
        assert!(graph.find_link(id).is_some());
        assert!(graph.slot(b).unwrap().is_connected());
    }
}
