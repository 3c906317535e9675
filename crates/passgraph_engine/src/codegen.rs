// SPDX-License-Identifier: MIT OR Apache-2.0
//! Slot metadata read by code generators.

use crate::graph::Graph;
use crate::id::NodeId;
use crate::slot::{Slot, SlotPlace};
use serde::{Deserialize, Serialize};

/// Everything a generator needs to know about one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSignature {
    /// Slot name
    pub name: String,
    /// Type tag
    pub slot_type: String,
    /// Input or output
    pub place: SlotPlace,
    /// Position among siblings
    pub index: u32,
}

impl From<&Slot> for SlotSignature {
    fn from(slot: &Slot) -> Self {
        Self {
            name: slot.name.clone(),
            slot_type: slot.slot_type.clone(),
            place: slot.place,
            index: slot.index,
        }
    }
}

impl Graph {
    /// Signatures of a node's slots: inputs then outputs, each by index
    pub fn slot_signatures(&self, node: NodeId) -> Vec<SlotSignature> {
        let Some(node) = self.node(node) else {
            return Vec::new();
        };
        node.inputs_by_index()
            .into_iter()
            .chain(node.outputs_by_index())
            .map(SlotSignature::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn test_signatures_in_index_order() {
        let mut graph = Graph::new();
        let root = graph.root();
        let id = graph
            .add_node(
                root,
                Node::new("Mesh Attributes", "MESH_ATTRIBUTES")
                    .with_output(Slot::output("Position", "TEXTURE_2D"))
                    .with_input(Slot::input("Mesh", "MESH"))
                    .with_output(Slot::output("Normal", "TEXTURE_2D"))
                    .with_input(Slot::input("Mask", "TEXTURE_2D")),
                true,
            )
            .unwrap();

        let names: Vec<(String, SlotPlace, u32)> = graph
            .slot_signatures(id)
            .into_iter()
            .map(|s| (s.name, s.place, s.index))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Mesh".to_string(), SlotPlace::Input, 0),
                ("Mask".to_string(), SlotPlace::Input, 1),
                ("Position".to_string(), SlotPlace::Output, 0),
                ("Normal".to_string(), SlotPlace::Output, 1),
            ]
        );
        assert!(graph.slot_signatures(NodeId(1)).is_empty());
    }
}
