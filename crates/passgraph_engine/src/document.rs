// SPDX-License-Identifier: MIT OR Apache-2.0
//! Saved-graph document model, shared by the XML and RON codecs.
//!
//! Loading is strictly ordered: every node and slot first, so that every
//! pin exists, then links, then the selected outputs, then a
//! `GraphIsLoaded` notification to the loaded nodes.

use crate::error::{GraphError, Result};
use crate::graph::{Graph, OutputButton};
use crate::id::{NodeId, PinId};
use crate::node::{Node, NodeRegistry};
use crate::notify::NotifyEvent;
use crate::slot::{Slot, SlotPlace, SlotRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A `node:pin` address as written in saved graphs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotAddress {
    /// Node id as saved
    pub node: NodeId,
    /// Pin id as saved
    pub pin: PinId,
}

impl From<SlotRef> for SlotAddress {
    fn from(slot: SlotRef) -> Self {
        Self {
            node: slot.node,
            pin: slot.pin,
        }
    }
}

impl fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.pin)
    }
}

impl FromStr for SlotAddress {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        let (node, pin) = s
            .split_once(':')
            .ok_or_else(|| GraphError::Malformed(format!("slot address '{s}' is not node:pin")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| GraphError::Malformed(format!("slot address '{s}' is not numeric")))
        };
        Ok(Self {
            node: NodeId(parse(node)?),
            pin: PinId(parse(pin)?),
        })
    }
}

impl TryFrom<String> for SlotAddress {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SlotAddress> for String {
    fn from(address: SlotAddress) -> Self {
        address.to_string()
    }
}

/// Saved canvas state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasRecord {
    /// Scroll offset
    pub offset: [f32; 2],
    /// Zoom factor
    pub scale: f32,
}

impl Default for CanvasRecord {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            scale: 1.0,
        }
    }
}

/// Saved slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Position among siblings of the same place
    pub index: u32,
    /// Slot name
    pub name: String,
    /// Type tag
    pub slot_type: String,
    /// Input or output
    pub place: SlotPlace,
    /// Pin id
    pub id: PinId,
}

/// Saved node; a sub-graph carries its own nested document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Display name
    pub name: String,
    /// Node type ID
    pub node_type: String,
    /// Position in the graph UI
    pub pos: [f32; 2],
    /// Node id
    pub id: NodeId,
    /// Slots, inputs then outputs
    #[serde(default)]
    pub slots: Vec<SlotRecord>,
    /// Children and links when the node is a sub-graph
    #[serde(default)]
    pub graph: Option<GraphDocument>,
}

/// Saved link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Consumer end
    pub input: SlotAddress,
    /// Producer end
    pub output: SlotAddress,
}

/// Saved graph output binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Bound button
    pub button: OutputButton,
    /// Bound slot
    pub ids: SlotAddress,
}

/// One saved graph level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Canvas state
    #[serde(default)]
    pub canvas: CanvasRecord,
    /// Child nodes
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    /// Links between the child nodes
    #[serde(default)]
    pub links: Vec<LinkRecord>,
    /// Output bindings (top level only)
    #[serde(default)]
    pub outputs: Vec<OutputRecord>,
}

impl GraphDocument {
    /// Parse a RON document
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Number of nodes, nested graphs included
    pub fn node_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| 1 + n.graph.as_ref().map_or(0, GraphDocument::node_count))
            .sum()
    }

    /// Number of slots, nested graphs included
    pub fn slot_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.slots.len() + n.graph.as_ref().map_or(0, GraphDocument::slot_count))
            .sum()
    }

    /// Number of links, nested graphs included
    pub fn link_count(&self) -> usize {
        self.links.len()
            + self
                .nodes
                .iter()
                .filter_map(|n| n.graph.as_ref())
                .map(GraphDocument::link_count)
                .sum::<usize>()
    }
}

/// File address to live slot, filled while nodes are created
#[derive(Debug, Default)]
struct Remap {
    slots: HashMap<SlotAddress, SlotRef>,
}

impl Graph {
    /// Snapshot the whole engine, starting at the root
    pub fn to_document(&self) -> GraphDocument {
        let mut document = self.document_of(self.root());
        document.outputs = OutputButton::ALL
            .iter()
            .filter_map(|button| {
                self.graph_output(*button).map(|slot| OutputRecord {
                    button: *button,
                    ids: slot.into(),
                })
            })
            .collect();
        document
    }

    /// Snapshot one graph level and everything below it
    pub fn document_of(&self, container: NodeId) -> GraphDocument {
        let Some(graph_node) = self.node(container) else {
            return GraphDocument::default();
        };
        let canvas = graph_node.canvas();
        let nodes = graph_node
            .children()
            .filter_map(|id| self.node(id))
            .map(|node| NodeRecord {
                name: node.name.clone(),
                node_type: node.node_type.clone(),
                pos: node.pos,
                id: node.id(),
                slots: node
                    .inputs_by_index()
                    .into_iter()
                    .chain(node.outputs_by_index())
                    .map(Slot::to_record)
                    .collect(),
                graph: node.is_graph().then(|| self.document_of(node.id())),
            })
            .collect();
        let links = graph_node
            .links()
            .iter()
            .map(|link| LinkRecord {
                input: link.input.into(),
                output: link.output.into(),
            })
            .collect();
        GraphDocument {
            canvas: CanvasRecord {
                offset: canvas.offset,
                scale: canvas.scale,
            },
            nodes,
            links,
            outputs: Vec::new(),
        }
    }

    /// Build a fresh engine from a document
    pub fn from_document(document: &GraphDocument, registry: &NodeRegistry) -> Result<Self> {
        let mut graph = Graph::new();
        graph.load_document(document, registry)?;
        Ok(graph)
    }

    /// Load a document under the root; returns the created top-level nodes
    pub fn load_document(&mut self, document: &GraphDocument, registry: &NodeRegistry) -> Result<Vec<NodeId>> {
        let root = self.root();
        self.load_document_into(root, document, registry)
    }

    /// Load a document under `container`; returns the created child nodes
    pub fn load_document_into(
        &mut self,
        container: NodeId,
        document: &GraphDocument,
        registry: &NodeRegistry,
    ) -> Result<Vec<NodeId>> {
        if self.node(container).is_none() {
            return Err(GraphError::NodeNotFound(container));
        }

        let mut remap = Remap::default();
        let mut levels: Vec<(NodeId, &GraphDocument)> = Vec::new();
        let mut loaded = Vec::new();
        let created = self.load_nodes(container, document, registry, &mut remap, &mut levels, &mut loaded);

        for (level, doc) in &levels {
            for record in &doc.links {
                let (Some(output), Some(input)) = (remap.slots.get(&record.output), remap.slots.get(&record.input)) else {
                    tracing::warn!(
                        "link {} -> {} in graph {} has an unresolved endpoint",
                        record.output,
                        record.input,
                        level
                    );
                    continue;
                };
                if !self.connect_slots(*output, *input) {
                    tracing::warn!("link {} -> {} could not be restored", record.output, record.input);
                }
            }
        }

        for record in &document.outputs {
            match remap.slots.get(&record.ids) {
                Some(slot) => {
                    self.select_for_graph_output(*slot, record.button);
                }
                None => tracing::warn!("graph output {} refers to an unknown slot", record.ids),
            }
        }

        self.notify_nodes(&loaded, NotifyEvent::GraphIsLoaded);
        tracing::debug!("loaded {} nodes under {}", loaded.len(), container);
        Ok(created)
    }

    fn load_nodes<'d>(
        &mut self,
        container: NodeId,
        document: &'d GraphDocument,
        registry: &NodeRegistry,
        remap: &mut Remap,
        levels: &mut Vec<(NodeId, &'d GraphDocument)>,
        loaded: &mut Vec<NodeId>,
    ) -> Vec<NodeId> {
        levels.push((container, document));
        self.set_canvas_offset(container, document.canvas.offset);
        self.set_canvas_scale(container, document.canvas.scale);

        let mut created = Vec::new();
        for record in &document.nodes {
            let node = match registry.get(&record.node_type) {
                Some(template) => template.instantiate(),
                None => dynamic_node(record),
            };
            let mut node = node.with_position(record.pos[0], record.pos[1]).with_id(record.id);
            node.name = record.name.clone();

            let Some(id) = self.add_node(container, node, false) else {
                continue;
            };
            created.push(id);
            loaded.push(id);

            for slot_record in &record.slots {
                let slot = match self.reconcile_slot(id, slot_record) {
                    Some(slot) => Some(slot),
                    None => {
                        tracing::debug!(
                            "node {} '{}' has no slot matching saved slot '{}', adding it",
                            id,
                            record.name,
                            slot_record.name
                        );
                        self.add_saved_slot(id, slot_record)
                    }
                };
                match slot {
                    Some(slot) => {
                        remap.slots.insert(
                            SlotAddress {
                                node: record.id,
                                pin: slot_record.id,
                            },
                            slot,
                        );
                    }
                    None => tracing::warn!("saved slot {} '{}' dropped", slot_record.id, slot_record.name),
                }
            }

            if let Some(nested) = &record.graph {
                self.load_nodes(id, nested, registry, remap, levels, loaded);
            }
        }
        created
    }

    fn add_saved_slot(&mut self, node: NodeId, record: &SlotRecord) -> Option<SlotRef> {
        let slot = Slot::from_record(record);
        let added = match record.place {
            SlotPlace::Input => self.add_input(node, slot, false, false)?,
            SlotPlace::Output => self.add_output(node, slot, false, false)?,
            SlotPlace::None => return None,
        };
        let live = self.slot_mut(added)?;
        live.apply_record(&SlotRecord {
            id: added.pin,
            ..record.clone()
        });
        Some(added)
    }

    /// Match a saved slot against the live slots of a node and adopt its
    /// pin id when that id is free. Returns the live slot either way.
    fn reconcile_slot(&mut self, node: NodeId, record: &SlotRecord) -> Option<SlotRef> {
        let candidate = self
            .node(node)?
            .slots()
            .find(|s| !s.already_set_by_file() && s.matches_record(record))
            .and_then(Slot::slot_ref)?;

        let target = if self.rekey_slot(candidate, record.id) {
            SlotRef::new(node, record.id)
        } else {
            tracing::debug!("pin {} taken, slot keeps {}", record.id, candidate.pin);
            candidate
        };
        let slot = self.slot_mut(target)?;
        let adopted = slot.apply_record(&SlotRecord {
            id: target.pin,
            ..record.clone()
        });
        debug_assert!(adopted, "matched slot refused its record");
        tracing::debug!("slot {} '{}' reconciled", target, record.name);
        Some(target)
    }
}

/// Rebuild a node of an unregistered type from its saved slots
fn dynamic_node(record: &NodeRecord) -> Node {
    let mut node = Node::new(record.name.clone(), record.node_type.clone());
    let mut slots: Vec<&SlotRecord> = record.slots.iter().collect();
    slots.sort_by_key(|s| (s.place == SlotPlace::Output, s.index));
    for slot in slots {
        node = match slot.place {
            SlotPlace::Input => node.with_input(Slot::from_record(slot)),
            SlotPlace::Output => node.with_output(Slot::from_record(slot)),
            SlotPlace::None => node,
        };
    }
    node
}
