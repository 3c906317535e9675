// SPDX-License-Identifier: MIT OR Apache-2.0
//! The graph engine: node arena, slot bookkeeping and deferred deletion.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::id::{IdAllocator, LinkId, NodeId, PinId};
use crate::link::Link;
use crate::node::{CanvasState, Node, NodeRegistry, GRAPH_NODE_TYPE, PUBLIC_NODE_PREFIX};
use crate::slot::{Slot, SlotInfo, SlotPlace, SlotRef};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mouse button a graph output is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputButton {
    /// Left button
    Left,
    /// Middle button
    Middle,
    /// Right button
    Right,
}

impl OutputButton {
    /// Every button, in saved order
    pub const ALL: [OutputButton; 3] = [Self::Left, Self::Middle, Self::Right];

    /// Tag used in saved graphs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Middle => "middle",
            Self::Right => "right",
        }
    }

    /// Parse a saved tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "left" => Some(Self::Left),
            "middle" => Some(Self::Middle),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    fn slot_index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Middle => 1,
            Self::Right => 2,
        }
    }
}

/// A node graph engine.
///
/// Owns every node of a tree of graphs, starting from a root graph node.
/// Nodes, slots and links refer to each other by id; a handle whose target
/// was removed resolves to `None`.
#[derive(Debug)]
pub struct Graph {
    config: EngineConfig,
    pub(crate) ids: IdAllocator,
    pub(crate) nodes: IndexMap<NodeId, Node>,
    root: NodeId,
    pub(crate) pin_owners: HashMap<PinId, NodeId>,
    pub(crate) link_owners: HashMap<LinkId, NodeId>,
    pending_deletions: IndexSet<NodeId>,
    graph_outputs: [Option<SlotRef>; 3],
}

impl Graph {
    /// Create an engine with the default configuration
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Create an engine from a configuration
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        let mut ids = config.allocator();
        // A validated configuration always leaves room for the root
        let root = ids.next_node_id().unwrap_or(NodeId(config.id_seed));
        let mut root_node = Node::graph("Root").with_id(root);
        root_node.canvas.scale = config.default_canvas_scale;
        let mut nodes = IndexMap::new();
        nodes.insert(root, root_node);
        Self {
            config,
            ids,
            nodes,
            root,
            pin_owners: HashMap::new(),
            link_owners: HashMap::new(),
            pending_deletions: IndexSet::new(),
            graph_outputs: [None; 3],
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Id allocator state
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Root graph node
    pub fn root(&self) -> NodeId {
        self.root
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Add a node under `parent`.
    ///
    /// With `assign_new_id` the node and every staged slot get fresh ids.
    /// Otherwise caller-supplied ids are kept unless already in use, in
    /// which case a fresh one is minted and a warning logged.
    pub fn add_node(&mut self, parent: NodeId, mut node: Node, assign_new_id: bool) -> Option<NodeId> {
        if !self.nodes.contains_key(&parent) {
            tracing::warn!("cannot add node '{}': parent {} not found", node.name, parent);
            return None;
        }

        let requested = node.id;
        let keep = !assign_new_id && requested.is_assigned();
        let id = if keep && !self.nodes.contains_key(&requested) && self.ids.can_adopt_node_id(requested) {
            self.ids.observe_node_id(requested);
            requested
        } else {
            let Some(fresh) = self.ids.next_node_id() else {
                tracing::warn!("cannot add node '{}': node id range exhausted", node.name);
                return None;
            };
            if keep {
                tracing::warn!("node id {} unusable, re-assigned to {}", requested, fresh);
            }
            fresh
        };

        node.id = id;
        node.parent = Some(parent);
        let staged = node.take_staged();
        tracing::debug!("add node {} '{}' ({}) under {}", id, node.name, node.node_type, parent);
        self.nodes.insert(id, node);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.insert(id);
        }

        for slot in staged {
            let place = slot.place;
            let hide_name = slot.hide_name;
            self.add_slot(id, slot, place, assign_new_id, hide_name);
        }

        self.set_changed(parent);
        Some(id)
    }

    /// Add an input slot to a node
    pub fn add_input(&mut self, node: NodeId, slot: Slot, assign_new_id: bool, hide_name: bool) -> Option<SlotRef> {
        self.add_slot(node, slot, SlotPlace::Input, assign_new_id, hide_name)
    }

    /// Add an output slot to a node
    pub fn add_output(&mut self, node: NodeId, slot: Slot, assign_new_id: bool, hide_name: bool) -> Option<SlotRef> {
        self.add_slot(node, slot, SlotPlace::Output, assign_new_id, hide_name)
    }

    fn add_slot(
        &mut self,
        node_id: NodeId,
        mut slot: Slot,
        place: SlotPlace,
        assign_new_id: bool,
        hide_name: bool,
    ) -> Option<SlotRef> {
        if place == SlotPlace::None {
            tracing::warn!("slot '{}' has no place, not added", slot.name);
            return None;
        }
        if !self.nodes.contains_key(&node_id) {
            tracing::warn!("cannot add slot '{}': node {} not found", slot.name, node_id);
            return None;
        }

        let requested = slot.pin_id();
        let keep = !assign_new_id && requested.is_assigned();
        let pin = if keep && !self.pin_owners.contains_key(&requested) && self.ids.can_adopt_pin_id(requested) {
            self.ids.observe_pin_id(requested);
            requested
        } else {
            let Some(fresh) = self.ids.new_pin_id() else {
                tracing::warn!("cannot add slot '{}': pin id range exhausted", slot.name);
                return None;
            };
            if keep {
                tracing::warn!("pin id {} unusable, re-assigned to {}", requested, fresh);
            }
            fresh
        };

        let node = self.nodes.get_mut(&node_id)?;
        let index = if slot.keeps_saved_index() && !node.has_slot_index(place, slot.index) {
            slot.index
        } else {
            node.next_slot_index(place)
        };
        slot.hide_name |= hide_name;
        slot.attach(node_id, place, index, pin);
        node.slot_map_mut(place)?.insert(pin, slot);
        self.pin_owners.insert(pin, node_id);
        Some(SlotRef::new(node_id, pin))
    }

    /// Instantiate a registered node type under `parent`
    pub fn create_node(
        &mut self,
        parent: NodeId,
        registry: &NodeRegistry,
        type_id: &str,
        pos: [f32; 2],
    ) -> Option<NodeId> {
        let Some(node) = registry.create_node(type_id) else {
            tracing::warn!("unknown node type '{}'", type_id);
            return None;
        };
        self.add_node(parent, node.with_position(pos[0], pos[1]), true)
    }

    /// Move a slot to another pin id, keeping every index in step.
    ///
    /// Only valid while the slot is unlinked.
    pub(crate) fn rekey_slot(&mut self, slot: SlotRef, new_pin: PinId) -> bool {
        if slot.pin == new_pin {
            return true;
        }
        if self.pin_owners.contains_key(&new_pin) || !self.ids.can_adopt_pin_id(new_pin) {
            return false;
        }
        let Some(node) = self.nodes.get_mut(&slot.node) else {
            return false;
        };
        let map = if node.inputs.contains_key(&slot.pin) {
            &mut node.inputs
        } else {
            &mut node.outputs
        };
        let Some(mut moved) = map.remove(&slot.pin) else {
            return false;
        };
        debug_assert!(!moved.is_connected(), "re-keying a linked slot");
        let place = moved.place;
        let index = moved.index;
        moved.attach(slot.node, place, index, new_pin);
        map.insert(new_pin, moved);
        self.pin_owners.remove(&slot.pin);
        self.pin_owners.insert(new_pin, slot.node);
        self.ids.observe_pin_id(new_pin);
        true
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Get all nodes, root included
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Direct children of a graph node
    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&parent)
            .map(|n| n.children().collect())
            .unwrap_or_default()
    }

    /// Every node below `parent`, parents before children
    pub fn descendants(&self, parent: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(parent).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Find a node anywhere below `parent`
    pub fn find_node(&self, parent: NodeId, id: NodeId) -> Option<&Node> {
        let node = self.nodes.get(&id)?;
        let mut cursor = node.parent;
        while let Some(ancestor) = cursor {
            if ancestor == parent {
                return Some(node);
            }
            cursor = self.nodes.get(&ancestor).and_then(|n| n.parent);
        }
        None
    }

    /// Find a direct child by display name
    pub fn find_node_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes
            .get(&parent)?
            .children()
            .find(|id| self.nodes.get(id).is_some_and(|n| n.name == name))
    }

    /// Children whose name marks them as public
    pub fn public_nodes(&self, parent: NodeId) -> Vec<NodeId> {
        self.children(parent)
            .into_iter()
            .filter(|id| {
                self.nodes
                    .get(id)
                    .is_some_and(|n| n.name.starts_with(PUBLIC_NODE_PREFIX))
            })
            .collect()
    }

    /// Resolve a slot handle
    pub fn slot(&self, slot: SlotRef) -> Option<&Slot> {
        self.nodes.get(&slot.node)?.slot(slot.pin)
    }

    pub(crate) fn slot_mut(&mut self, slot: SlotRef) -> Option<&mut Slot> {
        self.nodes.get_mut(&slot.node)?.slot_mut(slot.pin)
    }

    /// Snapshot of a live slot
    pub fn slot_info(&self, slot: SlotRef) -> Option<SlotInfo> {
        self.slot(slot)?.info()
    }

    /// Find the slot owning a pin anywhere in the engine
    pub fn find_slot_by_pin(&self, pin: PinId) -> Option<SlotRef> {
        let node = *self.pin_owners.get(&pin)?;
        self.slot(SlotRef::new(node, pin))?;
        Some(SlotRef::new(node, pin))
    }

    /// Find a slot of a node by name, inputs first
    pub fn find_slot_by_name(&self, node: NodeId, name: &str) -> Option<SlotRef> {
        self.nodes
            .get(&node)?
            .slots()
            .find(|s| s.name == name)
            .and_then(Slot::slot_ref)
    }

    /// Find a slot by node and pin
    pub fn find_slot_by_node_and_pin(&self, node: NodeId, pin: PinId) -> Option<SlotRef> {
        self.nodes.get(&node)?.slot(pin).and_then(Slot::slot_ref)
    }

    /// Slots of one place whose type tag matches
    pub fn slots_of_type(&self, node: NodeId, place: SlotPlace, slot_type: &str) -> Vec<SlotRef> {
        let Some(node) = self.nodes.get(&node) else {
            return Vec::new();
        };
        let slots: Box<dyn Iterator<Item = &Slot>> = match place {
            SlotPlace::Input => Box::new(node.inputs()),
            SlotPlace::Output => Box::new(node.outputs()),
            SlotPlace::None => Box::new(std::iter::empty()),
        };
        slots
            .filter(|s| s.slot_type == slot_type)
            .filter_map(Slot::slot_ref)
            .collect()
    }

    /// Input slots whose type tag matches
    pub fn input_slots_of_type(&self, node: NodeId, slot_type: &str) -> Vec<SlotRef> {
        self.slots_of_type(node, SlotPlace::Input, slot_type)
    }

    /// Output slots whose type tag matches
    pub fn output_slots_of_type(&self, node: NodeId, slot_type: &str) -> Vec<SlotRef> {
        self.slots_of_type(node, SlotPlace::Output, slot_type)
    }

    pub(crate) fn input_refs(&self, node: NodeId) -> Vec<SlotRef> {
        self.nodes
            .get(&node)
            .map(|n| n.inputs().filter_map(Slot::slot_ref).collect())
            .unwrap_or_default()
    }

    pub(crate) fn output_refs(&self, node: NodeId) -> Vec<SlotRef> {
        self.nodes
            .get(&node)
            .map(|n| n.outputs().filter_map(Slot::slot_ref).collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Mark a node and every ancestor as changed
    pub fn set_changed(&mut self, node: NodeId) {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            match self.nodes.get_mut(&id) {
                Some(n) => {
                    n.changed = true;
                    cursor = n.parent;
                }
                None => break,
            }
        }
    }

    /// Clear the changed flag of every node
    pub fn clear_changed(&mut self) {
        for node in self.nodes.values_mut() {
            node.changed = false;
        }
    }

    /// Canvas state of a graph node
    pub fn canvas(&self, node: NodeId) -> Option<CanvasState> {
        self.nodes.get(&node).map(|n| n.canvas)
    }

    /// Canvas scroll offset of a graph node
    pub fn canvas_offset(&self, node: NodeId) -> Option<[f32; 2]> {
        self.canvas(node).map(|c| c.offset)
    }

    /// Canvas zoom of a graph node
    pub fn canvas_scale(&self, node: NodeId) -> Option<f32> {
        self.canvas(node).map(|c| c.scale)
    }

    /// Set the canvas scroll offset
    pub fn set_canvas_offset(&mut self, node: NodeId, offset: [f32; 2]) -> bool {
        match self.nodes.get_mut(&node) {
            Some(n) => {
                n.canvas.offset = offset;
                true
            }
            None => false,
        }
    }

    /// Set the canvas zoom
    pub fn set_canvas_scale(&mut self, node: NodeId, scale: f32) -> bool {
        match self.nodes.get_mut(&node) {
            Some(n) => {
                n.canvas.scale = scale;
                true
            }
            None => false,
        }
    }

    /// Bind a slot to a graph output button
    pub fn select_for_graph_output(&mut self, slot: SlotRef, button: OutputButton) -> bool {
        if self.slot(slot).is_none() {
            tracing::warn!("cannot select slot {} for graph output: not found", slot);
            return false;
        }
        self.graph_outputs[button.slot_index()] = Some(slot);
        true
    }

    /// Slot bound to a graph output button, if it is still alive
    pub fn graph_output(&self, button: OutputButton) -> Option<SlotRef> {
        let slot = self.graph_outputs[button.slot_index()]?;
        self.slot(slot).map(|_| slot)
    }

    /// Unbind a graph output button
    pub fn clear_graph_output(&mut self, button: OutputButton) {
        self.graph_outputs[button.slot_index()] = None;
    }

    /// Links of a graph node as `(link, output pin, input pin)` for drawing
    pub fn visual_links(&self, container: NodeId) -> Vec<(LinkId, PinId, PinId)> {
        self.nodes
            .get(&container)
            .map(|n| {
                n.links
                    .iter()
                    .map(|l| (l.id, l.output.pin, l.input.pin))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every link in the engine
    pub fn all_links(&self) -> impl Iterator<Item = &Link> {
        self.nodes.values().flat_map(|n| n.links.iter())
    }

    /// Total number of links
    pub fn link_count(&self) -> usize {
        self.link_owners.len()
    }

    /// Total number of slots
    pub fn slot_count(&self) -> usize {
        self.pin_owners.len()
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete a child node now, or queue it for [`Graph::apply_deletions`].
    ///
    /// Refused when the node is not a child of `parent` or has deletion
    /// disabled.
    pub fn destroy_child_node_if_allowed(&mut self, parent: NodeId, id: NodeId, immediate: bool) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        if node.parent != Some(parent) {
            tracing::warn!("node {} is not a child of {}", id, parent);
            return false;
        }
        if node.deletion_disabled {
            tracing::debug!("deletion of node {} refused", id);
            return false;
        }
        if immediate {
            self.destroy_node(id)
        } else {
            self.pending_deletions.insert(id);
            true
        }
    }

    /// Nodes waiting for the deferred deletion pass
    pub fn pending_deletions(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pending_deletions.iter().copied()
    }

    /// Run the deferred deletion pass; returns the number of nodes removed
    pub fn apply_deletions(&mut self) -> usize {
        let pending: Vec<NodeId> = self.pending_deletions.drain(..).collect();
        let mut removed = 0;
        for id in pending {
            let allowed = self.nodes.get(&id).is_some_and(|n| !n.deletion_disabled);
            if allowed && self.destroy_node(id) {
                removed += 1;
            }
        }
        removed
    }

    /// Remove a node and its subtree now.
    ///
    /// Every link touching a removed slot is broken first, so no partner
    /// slot keeps a cached reference to it. The root cannot be removed.
    pub fn destroy_node(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.nodes.contains_key(&id) {
            return false;
        }

        let parent = self.nodes.get(&id).and_then(|n| n.parent);
        let mut subtree = vec![id];
        subtree.extend(self.descendants(id));

        // Children first, so inner links go before the outer ones
        for node_id in subtree.iter().rev() {
            let pins: Vec<SlotRef> = self
                .nodes
                .get(node_id)
                .map(|n| n.slots().filter_map(Slot::slot_ref).collect())
                .unwrap_or_default();
            for slot in pins {
                self.break_all_links_connected_to_slot(slot);
            }
        }

        for node_id in subtree.iter().rev() {
            if let Some(node) = self.nodes.shift_remove(node_id) {
                for pin in node.inputs.keys().chain(node.outputs.keys()) {
                    self.pin_owners.remove(pin);
                }
                for link in node.links.ids() {
                    self.link_owners.remove(&link);
                }
                self.pending_deletions.shift_remove(node_id);
                tracing::debug!("removed node {} '{}'", node_id, node.name);
            }
        }

        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.shift_remove(&id);
            }
            self.set_changed(parent);
        }
        true
    }

    /// Remove one slot after breaking its links
    pub fn remove_slot(&mut self, slot: SlotRef) -> bool {
        if self.slot(slot).is_none() {
            return false;
        }
        self.break_all_links_connected_to_slot(slot);
        let Some(node) = self.nodes.get_mut(&slot.node) else {
            return false;
        };
        let removed = node.inputs.remove(&slot.pin).or_else(|| node.outputs.remove(&slot.pin));
        if removed.is_some() {
            self.pin_owners.remove(&slot.pin);
            self.set_changed(slot.node);
        }
        removed.is_some()
    }

    /// Remove every child and link of a graph node
    pub fn clear_graph(&mut self, node: NodeId) -> bool {
        if !self.nodes.contains_key(&node) {
            return false;
        }
        for child in self.children(node) {
            self.destroy_node(child);
        }
        true
    }

    /// Remove every slot of a node, breaking links first
    pub fn clear_slots(&mut self, node: NodeId) -> bool {
        let Some(n) = self.nodes.get(&node) else {
            return false;
        };
        let slots: Vec<SlotRef> = n.slots().filter_map(Slot::slot_ref).collect();
        for slot in slots {
            self.remove_slot(slot);
        }
        true
    }

    /// Remove everything below the root and forget the output bindings
    pub fn clear(&mut self) {
        self.clear_graph(self.root);
        self.graph_outputs = [None; 3];
    }

    /// Whether a node is a sub-graph container
    pub fn is_graph_node(&self, node: NodeId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|n| n.is_graph() || n.node_type == GRAPH_NODE_TYPE)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
