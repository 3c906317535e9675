// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions: instances, behaviour hooks and type templates.

use crate::id::{LinkId, NodeId, PinId};
use crate::link::LinkTable;
use crate::notify::NotifyEvent;
use crate::slot::{Slot, SlotInfo, SlotPlace};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;
use std::fmt;

/// Type string of sub-graph nodes, including the root
pub const GRAPH_NODE_TYPE: &str = "GRAPH";

/// Name prefix of nodes exposed to an enclosing graph
pub const PUBLIC_NODE_PREFIX: &str = "PUBLIC_";

/// Palette group a pass template is listed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    /// Asset loaders (textures, models, cube maps)
    Assets,
    /// Render passes
    Renderers,
    /// Post-processing passes
    PostPro,
    /// Lights and shadows
    Lighting,
    /// Mesh and buffer utilities
    Utils,
    /// UI widgets
    Widgets,
    /// Scalar variables
    Variables,
    /// Everything else
    Misc,
    /// Graph outputs
    Output,
    /// Sub-graphs
    Graph,
    /// Custom/user-defined
    Custom,
}

/// Default compatibility rule: different nodes, opposite places, equal type tags
pub fn default_connect_policy(own: &SlotInfo, other: &SlotInfo) -> bool {
    own.slot.node != other.slot.node
        && own.place != other.place
        && own.place != SlotPlace::None
        && other.place != SlotPlace::None
        && own.slot_type == other.slot_type
}

/// Node-specific reactions to structural changes and notifications.
///
/// Hooks receive owned slot snapshots and only `&mut self`, so a hook can
/// never re-enter the graph while a connection is being made.
pub trait NodeBehavior: fmt::Debug {
    /// Decide whether `own` (a slot of this node) may link to `other`
    fn can_connect_slots(&self, own: &SlotInfo, other: &SlotInfo) -> bool {
        default_connect_policy(own, other)
    }

    /// A slot of this node gained or lost a link
    fn on_connection_change(&mut self, _slot: &SlotInfo, _connected: bool) {}

    /// A link was created between `own` and `other`
    fn on_connect(&mut self, _own: &SlotInfo, _other: &SlotInfo) {}

    /// A link between `own` and `other` was removed
    fn on_disconnect(&mut self, _own: &SlotInfo, _other: &SlotInfo) {}

    /// Receive an event. Graph-wide events carry no slots.
    fn treat_notification(
        &mut self,
        _event: NotifyEvent,
        _emitter: Option<&SlotInfo>,
        _receiver: Option<&SlotInfo>,
    ) {
    }

    /// Run the node's task for `frame`; `false` reports a failure
    fn execute(&mut self, _frame: u64) -> bool {
        true
    }

    /// Whether an upstream change is waiting to be processed
    fn needs_update(&self) -> bool {
        false
    }
}

/// Behaviour that keeps every default
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBehavior;

impl NodeBehavior for DefaultBehavior {}

/// Pan and zoom of a graph node's canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasState {
    /// Scroll offset
    pub offset: [f32; 2],
    /// Zoom factor
    pub scale: f32,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            scale: 1.0,
        }
    }
}

/// A node instance.
///
/// A node is either a leaf task or a sub-graph owning child nodes and the
/// links between them. Nodes live in the [`Graph`](crate::Graph) arena and
/// refer to each other by id only.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    /// Display name
    pub name: String,
    /// Node type ID
    pub node_type: String,
    /// Position in the graph UI
    pub pos: [f32; 2],
    /// Size in the graph UI
    pub size: [f32; 2],
    /// Refuse deletion requests
    pub deletion_disabled: bool,
    /// Hide the sub-graph from editing
    pub graph_disabled: bool,
    pub(crate) changed: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: IndexSet<NodeId>,
    pub(crate) inputs: BTreeMap<PinId, Slot>,
    pub(crate) outputs: BTreeMap<PinId, Slot>,
    pub(crate) links: LinkTable,
    pub(crate) canvas: CanvasState,
    pub(crate) last_executed_frame: Option<u64>,
    pub(crate) behavior: Box<dyn NodeBehavior>,
    staged: Vec<Slot>,
}

impl Node {
    /// Create a detached node with the default behaviour
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: NodeId::UNASSIGNED,
            name: name.into(),
            node_type: node_type.into(),
            pos: [0.0, 0.0],
            size: [0.0, 0.0],
            deletion_disabled: false,
            graph_disabled: false,
            changed: false,
            parent: None,
            children: IndexSet::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            links: LinkTable::new(),
            canvas: CanvasState::default(),
            last_executed_frame: None,
            behavior: Box::new(DefaultBehavior),
            staged: Vec::new(),
        }
    }

    /// Create a detached sub-graph node
    pub fn graph(name: impl Into<String>) -> Self {
        Self::new(name, GRAPH_NODE_TYPE)
    }

    /// Stage an input slot, attached when the node is added to a graph
    pub fn with_input(mut self, mut slot: Slot) -> Self {
        slot.place = SlotPlace::Input;
        self.staged.push(slot);
        self
    }

    /// Stage an output slot, attached when the node is added to a graph
    pub fn with_output(mut self, mut slot: Slot) -> Self {
        slot.place = SlotPlace::Output;
        self.staged.push(slot);
        self
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.pos = [x, y];
        self
    }

    /// Replace the behaviour
    pub fn with_behavior(mut self, behavior: Box<dyn NodeBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    /// Request a specific id; honoured unless it is already taken
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    /// Refuse deletion requests
    pub fn deletion_disabled(mut self) -> Self {
        self.deletion_disabled = true;
        self
    }

    /// Node ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Containing graph node
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child node ids in insertion order
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().copied()
    }

    /// Whether this node owns children
    pub fn is_graph(&self) -> bool {
        !self.children.is_empty()
    }

    /// Input slots in pin order
    pub fn inputs(&self) -> impl Iterator<Item = &Slot> {
        self.inputs.values()
    }

    /// Output slots in pin order
    pub fn outputs(&self) -> impl Iterator<Item = &Slot> {
        self.outputs.values()
    }

    /// Inputs then outputs
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.inputs.values().chain(self.outputs.values())
    }

    /// Input slots sorted by index
    pub fn inputs_by_index(&self) -> Vec<&Slot> {
        let mut slots: Vec<&Slot> = self.inputs.values().collect();
        slots.sort_by_key(|s| s.index);
        slots
    }

    /// Output slots sorted by index
    pub fn outputs_by_index(&self) -> Vec<&Slot> {
        let mut slots: Vec<&Slot> = self.outputs.values().collect();
        slots.sort_by_key(|s| s.index);
        slots
    }

    /// Get a slot by pin
    pub fn slot(&self, pin: PinId) -> Option<&Slot> {
        self.inputs.get(&pin).or_else(|| self.outputs.get(&pin))
    }

    pub(crate) fn slot_mut(&mut self, pin: PinId) -> Option<&mut Slot> {
        match self.inputs.get_mut(&pin) {
            Some(slot) => Some(slot),
            None => self.outputs.get_mut(&pin),
        }
    }

    pub(crate) fn slot_map_mut(&mut self, place: SlotPlace) -> Option<&mut BTreeMap<PinId, Slot>> {
        match place {
            SlotPlace::Input => Some(&mut self.inputs),
            SlotPlace::Output => Some(&mut self.outputs),
            SlotPlace::None => None,
        }
    }

    /// Number of slots on one side
    pub fn slot_count(&self, place: SlotPlace) -> usize {
        match place {
            SlotPlace::Input => self.inputs.len(),
            SlotPlace::Output => self.outputs.len(),
            SlotPlace::None => 0,
        }
    }

    /// Whether a slot of `place` already sits at `index`
    pub fn has_slot_index(&self, place: SlotPlace, index: u32) -> bool {
        match place {
            SlotPlace::Input => self.inputs.values().any(|s| s.index == index),
            SlotPlace::Output => self.outputs.values().any(|s| s.index == index),
            SlotPlace::None => false,
        }
    }

    /// Index given to the next slot of `place`: one past the highest in use
    pub fn next_slot_index(&self, place: SlotPlace) -> u32 {
        let slots = match place {
            SlotPlace::Input => &self.inputs,
            SlotPlace::Output => &self.outputs,
            SlotPlace::None => return 0,
        };
        slots.values().map(|s| s.index.saturating_add(1)).max().unwrap_or(0)
    }

    /// Links owned by this node, when it is a graph
    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Link ids owned by this node
    pub fn link_ids(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.links.ids()
    }

    /// Whether the node or something below it changed
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Canvas state
    pub fn canvas(&self) -> CanvasState {
        self.canvas
    }

    /// Frame this node last executed in
    pub fn last_executed_frame(&self) -> Option<u64> {
        self.last_executed_frame
    }

    /// Behaviour hooks
    pub fn behavior(&self) -> &dyn NodeBehavior {
        self.behavior.as_ref()
    }

    pub(crate) fn take_staged(&mut self) -> Vec<Slot> {
        std::mem::take(&mut self.staged)
    }
}

/// Template for one kind of pass node
#[derive(Debug, Clone)]
pub struct NodeType {
    /// Type tag written to saved graphs, e.g. `BLUR`
    pub id: String,
    /// Name given to new instances
    pub name: String,
    pub category: NodeCategory,
    /// Tooltip text
    pub description: String,
    /// Input slots every instance starts with
    pub inputs: Vec<Slot>,
    /// Output slots every instance starts with
    pub outputs: Vec<Slot>,
    /// Makes the hooks for a new instance
    pub behavior: fn() -> Box<dyn NodeBehavior>,
}

impl NodeType {
    /// A fresh instance with unassigned ids
    pub fn instantiate(&self) -> Node {
        let mut node = Node::new(self.name.clone(), self.id.clone()).with_behavior((self.behavior)());
        for slot in &self.inputs {
            node = node.with_input(slot.clone());
        }
        for slot in &self.outputs {
            node = node.with_output(slot.clone());
        }
        node
    }
}

/// Behaviour factory for templates without custom hooks
pub fn default_behavior() -> Box<dyn NodeBehavior> {
    Box::new(DefaultBehavior)
}

/// Pass-node templates keyed by type tag.
///
/// Loading consults it to rebuild saved nodes with their default slots and
/// hooks; a tag it does not know becomes a plain node built from the saved
/// slots.
#[derive(Debug)]
pub struct NodeRegistry {
    types: IndexMap<String, NodeType>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// Add a template; a later one with the same tag replaces the earlier
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.id.clone(), node_type);
    }

    pub fn get(&self, type_tag: &str) -> Option<&NodeType> {
        self.types.get(type_tag)
    }

    /// Templates in registration order
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Templates shown under one palette category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Instantiate the template for `type_tag`, not yet attached to a graph
    pub fn create_node(&self, type_tag: &str) -> Option<Node> {
        self.get(type_tag).map(NodeType::instantiate)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
