// SPDX-License-Identifier: MIT OR Apache-2.0
//! Notification propagation along links.
//!
//! Front notifications travel from output slots to the inputs linked to
//! them ("a producer changed"); back notifications travel from input slots
//! to their producers. Delivery is synchronous and depth-first.
//!
//! Only a few events travel further than one hop: a receiver of
//! [`NotifyEvent::GraphIsLoaded`], [`NotifyEvent::NewFrameAvailable`] or
//! [`NotifyEvent::SomeTasksWasUpdated`] passes it on along its own links.
//! A node reached along two paths hears the event twice. A node already on
//! the current path still receives the event but does not forward it again,
//! which is what ends a walk around a link cycle.

use crate::graph::Graph;
use crate::id::NodeId;
use crate::slot::SlotRef;
use serde::{Deserialize, Serialize};

/// Events exchanged between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyEvent {
    /// A graph finished loading
    GraphIsLoaded,
    /// The render loop started a new frame
    NewFrameAvailable,
    /// Upstream tasks changed
    SomeTasksWasUpdated,
    /// A texture was rewritten
    TextureUpdateDone,
    /// A texture group was rewritten
    TextureGroupUpdateDone,
    /// A model was reloaded
    ModelUpdateDone,
    /// A light group changed
    LightGroupUpdateDone,
    /// A variable changed
    VariableUpdateDone,
    /// A storage buffer was rewritten
    StorageBufferUpdateDone,
    /// A texel buffer was rewritten
    TexelBufferUpdateDone,
    /// An acceleration structure was rebuilt
    AccelStructureUpdateDone,
    /// A shader pass changed
    ShaderPassUpdateDone,
}

impl NotifyEvent {
    /// Graph-wide events are delivered without emitter or receiver slots
    pub fn is_global(&self) -> bool {
        matches!(self, Self::GraphIsLoaded | Self::NewFrameAvailable)
    }

    /// Receivers pass these on along their own links
    pub fn is_forwarded(&self) -> bool {
        matches!(
            self,
            Self::GraphIsLoaded | Self::NewFrameAvailable | Self::SomeTasksWasUpdated
        )
    }
}

/// Propagation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outputs to linked inputs
    Front,
    /// Inputs to linked outputs
    Back,
}

impl Graph {
    fn deliver(&mut self, emitter: SlotRef, receiver: SlotRef, event: NotifyEvent) -> bool {
        let (Some(emitter_info), Some(receiver_info)) = (self.slot_info(emitter), self.slot_info(receiver)) else {
            tracing::warn!("dropping {:?}: {} or {} vanished", event, emitter, receiver);
            return false;
        };
        match self.nodes.get_mut(&receiver.node) {
            Some(node) => {
                node.behavior
                    .treat_notification(event, Some(&emitter_info), Some(&receiver_info));
                true
            }
            None => false,
        }
    }

    fn emitting_slots(&self, node: NodeId, direction: Direction, slot_type: Option<&str>) -> Vec<SlotRef> {
        let slots = match direction {
            Direction::Front => self.output_refs(node),
            Direction::Back => self.input_refs(node),
        };
        match slot_type {
            Some(tag) => slots
                .into_iter()
                .filter(|s| self.slot(*s).is_some_and(|slot| slot.slot_type == tag))
                .collect(),
            None => slots,
        }
    }

    /// Send `event` from one slot to every slot linked to it
    pub fn notify_slot(&mut self, slot: SlotRef, event: NotifyEvent) -> usize {
        let partners: Vec<SlotRef> = match self.slot(slot) {
            Some(s) => s.linked_slots().to_vec(),
            None => return 0,
        };
        partners
            .into_iter()
            .filter(|partner| self.deliver(slot, *partner, event))
            .count()
    }

    /// Send the update event matching the slot's kind, if it has one
    pub fn notify_slot_update(&mut self, slot: SlotRef) -> usize {
        match self.slot(slot).and_then(|s| s.kind().update_event()) {
            Some(event) => self.notify_slot(slot, event),
            None => 0,
        }
    }

    fn send(&mut self, node: NodeId, direction: Direction, slot_type: Option<&str>, event: NotifyEvent) -> usize {
        self.emitting_slots(node, direction, slot_type)
            .into_iter()
            .map(|slot| self.notify_slot(slot, event))
            .sum()
    }

    fn propagate(&mut self, node: NodeId, direction: Direction, event: NotifyEvent, path: &mut Vec<NodeId>) -> usize {
        path.push(node);
        let mut delivered = 0;
        for slot in self.emitting_slots(node, direction, None) {
            let partners: Vec<SlotRef> = self
                .slot(slot)
                .map(|s| s.linked_slots().to_vec())
                .unwrap_or_default();
            for partner in partners {
                if !self.deliver(slot, partner, event) {
                    continue;
                }
                delivered += 1;
                if event.is_forwarded() && !path.contains(&partner.node) {
                    delivered += self.propagate(partner.node, direction, event, path);
                }
            }
        }
        path.pop();
        delivered
    }

    /// One hop: from every output of `node` to the linked inputs
    pub fn send_front_notification(&mut self, node: NodeId, event: NotifyEvent) -> usize {
        self.send(node, Direction::Front, None, event)
    }

    /// One hop, restricted to outputs with the given type tag
    pub fn send_front_notification_of_type(&mut self, node: NodeId, slot_type: &str, event: NotifyEvent) -> usize {
        self.send(node, Direction::Front, Some(slot_type), event)
    }

    /// Depth-first downstream of `node`; see the module docs for which
    /// events go past the first hop
    pub fn propagate_front_notification(&mut self, node: NodeId, event: NotifyEvent) -> usize {
        self.propagate(node, Direction::Front, event, &mut Vec::new())
    }

    /// One hop: from every input of `node` to the linked outputs
    pub fn send_back_notification(&mut self, node: NodeId, event: NotifyEvent) -> usize {
        self.send(node, Direction::Back, None, event)
    }

    /// One hop, restricted to inputs with the given type tag
    pub fn send_back_notification_of_type(&mut self, node: NodeId, slot_type: &str, event: NotifyEvent) -> usize {
        self.send(node, Direction::Back, Some(slot_type), event)
    }

    /// Depth-first upstream of `node`
    pub fn propagate_back_notification(&mut self, node: NodeId, event: NotifyEvent) -> usize {
        self.propagate(node, Direction::Back, event, &mut Vec::new())
    }

    /// Deliver a graph-wide event to a set of nodes
    pub fn notify_nodes(&mut self, nodes: &[NodeId], event: NotifyEvent) -> usize {
        let mut delivered = 0;
        for id in nodes {
            if let Some(node) = self.nodes.get_mut(id) {
                node.behavior.treat_notification(event, None, None);
                delivered += 1;
            }
        }
        delivered
    }

    /// Tell every node below `container` that loading finished
    pub fn notify_graph_loaded(&mut self, container: NodeId) -> usize {
        let nodes = self.descendants(container);
        self.notify_nodes(&nodes, NotifyEvent::GraphIsLoaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeBehavior};
    use crate::slot::{Slot, SlotInfo};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(String, NotifyEvent, Option<String>)>>>;

    #[derive(Debug)]
    struct Listener {
        name: String,
        log: Log,
    }

    impl NodeBehavior for Listener {
        fn treat_notification(&mut self, event: NotifyEvent, _emitter: Option<&SlotInfo>, receiver: Option<&SlotInfo>) {
            self.log
                .borrow_mut()
                .push((self.name.clone(), event, receiver.map(|r| r.name.clone())));
        }
    }

    fn pass(graph: &mut Graph, log: &Log, name: &str) -> NodeId {
        let root = graph.root();
        graph
            .add_node(
                root,
                Node::new(name, "PASS")
                    .with_input(Slot::input("in", "TEXTURE_2D"))
                    .with_output(Slot::output("out", "TEXTURE_2D"))
                    .with_output(Slot::output("lights", "LIGHT_GROUP"))
                    .with_input(Slot::input("lights_in", "LIGHT_GROUP"))
                    .with_input(Slot::input("aux", "TEXTURE_2D"))
                    .with_behavior(Box::new(Listener {
                        name: name.to_string(),
                        log: Rc::clone(log),
                    })),
                true,
            )
            .unwrap()
    }

    fn link(graph: &mut Graph, from: NodeId, out: &str, to: NodeId, inp: &str) {
        let o = graph.find_slot_by_name(from, out).unwrap();
        let i = graph.find_slot_by_name(to, inp).unwrap();
        assert!(graph.connect_slots(o, i));
    }

    fn receivers(log: &Log) -> Vec<String> {
        log.borrow().iter().map(|(n, _, _)| n.clone()).collect()
    }

    #[test]
    fn test_send_is_one_hop() {
        let mut graph = Graph::new();
        let log = Log::default();
        let a = pass(&mut graph, &log, "A");
        let b = pass(&mut graph, &log, "B");
        let c = pass(&mut graph, &log, "C");
        link(&mut graph, a, "out", b, "in");
        link(&mut graph, b, "out", c, "in");

        assert_eq!(graph.send_front_notification(a, NotifyEvent::TextureUpdateDone), 1);
        assert_eq!(receivers(&log), vec!["B"]);
    }

    #[test]
    fn test_propagate_front_and_back() {
        let mut graph = Graph::new();
        let log = Log::default();
        let a = pass(&mut graph, &log, "A");
        let b = pass(&mut graph, &log, "B");
        let c = pass(&mut graph, &log, "C");
        link(&mut graph, a, "out", b, "in");
        link(&mut graph, b, "out", c, "in");

        assert_eq!(graph.propagate_front_notification(a, NotifyEvent::NewFrameAvailable), 2);
        assert_eq!(receivers(&log), vec!["B", "C"]);

        log.borrow_mut().clear();
        assert_eq!(graph.propagate_back_notification(c, NotifyEvent::SomeTasksWasUpdated), 2);
        assert_eq!(receivers(&log), vec!["B", "A"]);
    }

    #[test]
    fn test_per_type_fan_out() {
        let mut graph = Graph::new();
        let log = Log::default();
        let a = pass(&mut graph, &log, "A");
        let b = pass(&mut graph, &log, "B");
        let c = pass(&mut graph, &log, "C");
        link(&mut graph, a, "out", b, "in");
        link(&mut graph, a, "lights", c, "lights_in");

        assert_eq!(
            graph.send_front_notification_of_type(a, "LIGHT_GROUP", NotifyEvent::LightGroupUpdateDone),
            1
        );
        assert_eq!(
            log.borrow()[0],
            ("C".to_string(), NotifyEvent::LightGroupUpdateDone, Some("lights_in".to_string()))
        );

        log.borrow_mut().clear();
        assert_eq!(
            graph.send_back_notification_of_type(c, "TEXTURE_2D", NotifyEvent::TextureUpdateDone),
            0
        );
        assert_eq!(
            graph.send_back_notification_of_type(c, "LIGHT_GROUP", NotifyEvent::LightGroupUpdateDone),
            1
        );
        assert_eq!(receivers(&log), vec!["A"]);
    }

    #[test]
    fn test_propagation_terminates_on_cycle() {
        let mut graph = Graph::new();
        let log = Log::default();
        let a = pass(&mut graph, &log, "A");
        let b = pass(&mut graph, &log, "B");
        link(&mut graph, a, "out", b, "in");
        link(&mut graph, b, "out", a, "in");

        let delivered = graph.propagate_front_notification(a, NotifyEvent::NewFrameAvailable);
        assert_eq!(delivered, 2);
        assert_eq!(receivers(&log), vec!["B", "A"]);
    }

    #[test]
    fn test_diamond_delivers_once_per_path() {
        let mut graph = Graph::new();
        let log = Log::default();
        let a = pass(&mut graph, &log, "A");
        let b = pass(&mut graph, &log, "B");
        let c = pass(&mut graph, &log, "C");
        let d = pass(&mut graph, &log, "D");
        let e = pass(&mut graph, &log, "E");
        link(&mut graph, a, "out", b, "in");
        link(&mut graph, a, "lights", c, "lights_in");
        link(&mut graph, b, "out", d, "in");
        link(&mut graph, c, "out", d, "aux");
        link(&mut graph, d, "out", e, "in");

        assert_eq!(graph.propagate_front_notification(a, NotifyEvent::NewFrameAvailable), 6);
        let seen = receivers(&log);
        assert_eq!(seen.iter().filter(|n| *n == "D").count(), 2);
        assert_eq!(seen.iter().filter(|n| *n == "E").count(), 2);
    }

    #[test]
    fn test_update_events_stop_after_one_hop() {
        let mut graph = Graph::new();
        let log = Log::default();
        let a = pass(&mut graph, &log, "A");
        let b = pass(&mut graph, &log, "B");
        let c = pass(&mut graph, &log, "C");
        link(&mut graph, a, "out", b, "in");
        link(&mut graph, b, "out", c, "in");

        assert_eq!(graph.propagate_front_notification(a, NotifyEvent::TextureUpdateDone), 1);
        assert_eq!(receivers(&log), vec!["B"]);

        log.borrow_mut().clear();
        assert_eq!(graph.propagate_back_notification(c, NotifyEvent::ModelUpdateDone), 1);
        assert_eq!(receivers(&log), vec!["B"]);
        assert!(NotifyEvent::SomeTasksWasUpdated.is_forwarded());
        assert!(!NotifyEvent::ShaderPassUpdateDone.is_forwarded());
    }

    #[test]
    fn test_slot_update_event() {
        let mut graph = Graph::new();
        let log = Log::default();
        let a = pass(&mut graph, &log, "A");
        let b = pass(&mut graph, &log, "B");
        link(&mut graph, a, "lights", b, "lights_in");

        let lights = graph.find_slot_by_name(a, "lights").unwrap();
        assert_eq!(graph.notify_slot_update(lights), 1);
        assert_eq!(log.borrow()[0].1, NotifyEvent::LightGroupUpdateDone);
    }

    #[test]
    fn test_graph_loaded_reaches_every_node() {
        let mut graph = Graph::new();
        let log = Log::default();
        pass(&mut graph, &log, "A");
        pass(&mut graph, &log, "B");
        let root = graph.root();
        assert_eq!(graph.notify_graph_loaded(root), 2);
        assert!(log.borrow().iter().all(|(_, e, r)| *e == NotifyEvent::GraphIsLoaded && r.is_none()));
        assert!(NotifyEvent::GraphIsLoaded.is_global());
        assert!(!NotifyEvent::ModelUpdateDone.is_global());
    }
}
