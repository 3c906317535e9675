// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node types for GPU pass authoring.
//!
//! Slot layouts and descriptor bindings follow the pass modules these
//! nodes drive; the passes themselves live outside the engine.

use crate::node::{default_behavior, NodeBehavior, NodeCategory, NodeRegistry, NodeType};
use crate::notify::NotifyEvent;
use crate::slot::{Slot, SlotInfo, SlotKind, SlotPlace, VariableKind};

/// Behaviour shared by pass nodes: an update event arriving on an input
/// marks the pass for re-execution; running it clears the mark.
#[derive(Debug, Default)]
pub struct PassBehavior {
    needs_update: bool,
}

impl NodeBehavior for PassBehavior {
    fn on_connection_change(&mut self, slot: &SlotInfo, _connected: bool) {
        if slot.place == SlotPlace::Input {
            self.needs_update = true;
        }
    }

    fn treat_notification(&mut self, event: NotifyEvent, _emitter: Option<&SlotInfo>, receiver: Option<&SlotInfo>) {
        match receiver {
            Some(slot) if slot.place == SlotPlace::Input => {
                if slot.kind().update_event() == Some(event) || event == NotifyEvent::SomeTasksWasUpdated {
                    self.needs_update = true;
                }
            }
            None if event == NotifyEvent::GraphIsLoaded => self.needs_update = true,
            _ => {}
        }
    }

    fn execute(&mut self, _frame: u64) -> bool {
        self.needs_update = false;
        true
    }

    fn needs_update(&self) -> bool {
        self.needs_update
    }
}

fn pass_behavior() -> Box<dyn NodeBehavior> {
    Box::new(PassBehavior::default())
}

fn texture_in(name: &str, binding: u32) -> Slot {
    Slot::input(name, SlotKind::Texture2D.tag()).with_binding(binding)
}

fn texture_out(name: &str, binding: u32) -> Slot {
    Slot::output(name, SlotKind::Texture2D.tag()).with_binding(binding)
}

/// Create the pass node registry with all built-in node types
pub fn create_pass_library() -> NodeRegistry {
    let mut registry = NodeRegistry::new();

    // ========================================================================
    // Assets
    // ========================================================================

    registry.register(NodeType {
        id: "TEXTURE_2D".to_string(),
        name: "Texture 2D".to_string(),
        category: NodeCategory::Assets,
        description: "Texture loaded from an image file".to_string(),
        inputs: vec![],
        outputs: vec![texture_out("Output", 0)],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "CUBE_MAP".to_string(),
        name: "Cube Map".to_string(),
        category: NodeCategory::Assets,
        description: "Cube map loaded from six image files".to_string(),
        inputs: vec![],
        outputs: vec![Slot::from_kind("Output", &SlotKind::TextureCube, SlotPlace::Output)],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "MESH".to_string(),
        name: "Model".to_string(),
        category: NodeCategory::Assets,
        description: "Mesh loaded from a model file".to_string(),
        inputs: vec![],
        outputs: vec![Slot::from_kind("Output", &SlotKind::Model, SlotPlace::Output)],
        behavior: pass_behavior,
    });

    // ========================================================================
    // Lighting
    // ========================================================================

    registry.register(NodeType {
        id: "LIGHT_GROUP".to_string(),
        name: "Lights".to_string(),
        category: NodeCategory::Lighting,
        description: "Group of scene lights".to_string(),
        inputs: vec![],
        outputs: vec![Slot::from_kind("Lights", &SlotKind::LightGroup, SlotPlace::Output)],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "SHADOW_MAPPING".to_string(),
        name: "Shadow Map".to_string(),
        category: NodeCategory::Lighting,
        description: "One shadow map per light".to_string(),
        inputs: vec![
            Slot::from_kind("Lights", &SlotKind::LightGroup, SlotPlace::Input),
            Slot::from_kind("Mesh", &SlotKind::Model, SlotPlace::Input),
        ],
        outputs: vec![
            Slot::from_kind("Lights", &SlotKind::LightGroup, SlotPlace::Output),
            Slot::from_kind("Outputs", &SlotKind::TextureGroup, SlotPlace::Output),
        ],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "DIFFUSE".to_string(),
        name: "Diffuse".to_string(),
        category: NodeCategory::Lighting,
        description: "Diffuse lighting term".to_string(),
        inputs: vec![
            Slot::from_kind("Lights", &SlotKind::LightGroup, SlotPlace::Input),
            texture_in("Position", 0),
            texture_in("Normal", 1),
        ],
        outputs: vec![texture_out("Output", 0)],
        behavior: pass_behavior,
    });

    // ========================================================================
    // Renderers
    // ========================================================================

    registry.register(NodeType {
        id: "MODEL_RENDERER".to_string(),
        name: "Model Renderer".to_string(),
        category: NodeCategory::Renderers,
        description: "Rasterizes a model".to_string(),
        inputs: vec![
            Slot::from_kind("Model", &SlotKind::Model, SlotPlace::Input),
            texture_in("Mask", 1),
        ],
        outputs: vec![
            texture_out("Output", 0).hidden_name(),
            Slot::from_kind("Pass", &SlotKind::ShaderPass, SlotPlace::Output).hidden_name(),
        ],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "PBR_RENDERER".to_string(),
        name: "PBR Renderer".to_string(),
        category: NodeCategory::Renderers,
        description: "Physically based shading of a G-buffer".to_string(),
        inputs: vec![
            Slot::from_kind("Lights", &SlotKind::LightGroup, SlotPlace::Input),
            texture_in("Position", 0),
            texture_in("Normal", 1),
            texture_in("Albedo", 2),
            texture_in("Mask", 3),
            texture_in("AO", 4),
            Slot::from_kind("Shadow Maps", &SlotKind::TextureGroup, SlotPlace::Input),
        ],
        outputs: vec![texture_out("Output", 0)],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "DEFERRED_RENDERER".to_string(),
        name: "Deferred Renderer".to_string(),
        category: NodeCategory::Renderers,
        description: "Composes lighting terms from a G-buffer".to_string(),
        inputs: vec![
            texture_in("Position", 0),
            texture_in("Normal", 1),
            texture_in("Albedo", 2),
            texture_in("Diffuse", 3),
            texture_in("Specular", 4),
            texture_in("Attenuation", 5),
            texture_in("Mask", 6),
        ],
        outputs: vec![texture_out("Output", 0)],
        behavior: pass_behavior,
    });

    // ========================================================================
    // Post-processing
    // ========================================================================

    registry.register(NodeType {
        id: "BLUR".to_string(),
        name: "Blur".to_string(),
        category: NodeCategory::PostPro,
        description: "Gaussian blur".to_string(),
        inputs: vec![texture_in("Input", 0)],
        outputs: vec![texture_out("Output", 0)],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "TONE_MAP".to_string(),
        name: "Tone Map".to_string(),
        category: NodeCategory::PostPro,
        description: "HDR to LDR tone mapping".to_string(),
        inputs: vec![texture_in("Input", 0)],
        outputs: vec![texture_out("Output", 0)],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "SSAO".to_string(),
        name: "SSAO".to_string(),
        category: NodeCategory::PostPro,
        description: "Screen space ambient occlusion".to_string(),
        inputs: vec![
            texture_in("Position", 0),
            texture_in("Normal", 1),
            texture_in("Blue Noise", 2),
        ],
        outputs: vec![texture_out("Output", 0)],
        behavior: pass_behavior,
    });

    // ========================================================================
    // Utils
    // ========================================================================

    registry.register(NodeType {
        id: "MESH_ATTRIBUTES".to_string(),
        name: "Mesh Attributes".to_string(),
        category: NodeCategory::Utils,
        description: "Renders mesh attributes to a G-buffer".to_string(),
        inputs: vec![
            Slot::from_kind("Mesh", &SlotKind::Model, SlotPlace::Input),
            texture_in("Mask", 0),
        ],
        outputs: vec![
            texture_out("Position", 0),
            texture_out("Normal", 1),
            texture_out("Tangeant", 2),
            texture_out("BiTangeant", 3),
            texture_out("UV", 4),
            texture_out("Color", 5),
            texture_out("Depth", 6),
        ],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: "SCENE_MERGER".to_string(),
        name: "Scene Merger".to_string(),
        category: NodeCategory::Misc,
        description: "Renders several shader passes into one target".to_string(),
        inputs: vec![Slot::from_kind("Passes", &SlotKind::ShaderPass, SlotPlace::Input).accept_many_inputs()],
        outputs: vec![texture_out("Output", 0).hidden_name()],
        behavior: pass_behavior,
    });

    // ========================================================================
    // Variables
    // ========================================================================

    registry.register(NodeType {
        id: "WIDGET_BOOLEAN".to_string(),
        name: "Boolean".to_string(),
        category: NodeCategory::Variables,
        description: "Boolean value edited from the UI".to_string(),
        inputs: vec![],
        outputs: vec![Slot::from_kind(
            "Output",
            &SlotKind::Variable(VariableKind::Boolean),
            SlotPlace::Output,
        )
        .with_widget()],
        behavior: default_behavior,
    });

    registry.register(NodeType {
        id: "WIDGET_FLOAT".to_string(),
        name: "Float".to_string(),
        category: NodeCategory::Variables,
        description: "Float value edited from the UI".to_string(),
        inputs: vec![],
        outputs: vec![Slot::from_kind(
            "Output",
            &SlotKind::Variable(VariableKind::Float),
            SlotPlace::Output,
        )
        .with_widget()],
        behavior: default_behavior,
    });

    // ========================================================================
    // Output
    // ========================================================================

    registry.register(NodeType {
        id: "OUTPUT".to_string(),
        name: "Scene Output".to_string(),
        category: NodeCategory::Output,
        description: "Final image of the graph".to_string(),
        inputs: vec![texture_in("Output", 0).hidden_name()],
        outputs: vec![],
        behavior: pass_behavior,
    });

    registry.register(NodeType {
        id: crate::node::GRAPH_NODE_TYPE.to_string(),
        name: "Graph".to_string(),
        category: NodeCategory::Graph,
        description: "Nested graph".to_string(),
        inputs: vec![],
        outputs: vec![],
        behavior: default_behavior,
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn test_library_contents() {
        let registry = create_pass_library();
        assert!(registry.get("PBR_RENDERER").is_some());
        assert!(registry.get("MESH_ATTRIBUTES").is_some());
        assert_eq!(registry.types_in_category(NodeCategory::Output).count(), 1);
        assert!(registry.types_in_category(NodeCategory::PostPro).count() >= 3);

        let pbr = registry.get("PBR_RENDERER").unwrap();
        assert_eq!(pbr.inputs.len(), 7);
        assert_eq!(pbr.inputs[6].slot_type, "TEXTURE_2D_GROUP");
        assert_eq!(pbr.inputs[3].descriptor_binding, 2);
    }

    #[test]
    fn test_gbuffer_chain() {
        let registry = create_pass_library();
        let mut graph = Graph::new();
        let root = graph.root();

        let model = graph.create_node(root, &registry, "MESH", [0.0, 0.0]).unwrap();
        let attributes = graph.create_node(root, &registry, "MESH_ATTRIBUTES", [200.0, 0.0]).unwrap();
        let ssao = graph.create_node(root, &registry, "SSAO", [400.0, 0.0]).unwrap();
        let output = graph.create_node(root, &registry, "OUTPUT", [600.0, 0.0]).unwrap();

        let mesh_out = graph.find_slot_by_name(model, "Output").unwrap();
        let mesh_in = graph.find_slot_by_name(attributes, "Mesh").unwrap();
        assert!(graph.connect_slots(mesh_out, mesh_in));

        let position = graph.find_slot_by_name(attributes, "Position").unwrap();
        let normal = graph.find_slot_by_name(attributes, "Normal").unwrap();
        assert!(graph.connect_slots(position, graph.find_slot_by_name(ssao, "Position").unwrap()));
        assert!(graph.connect_slots(normal, graph.find_slot_by_name(ssao, "Normal").unwrap()));

        // A mesh cannot feed a texture input
        assert!(!graph.connect_slots(mesh_out, graph.find_slot_by_name(ssao, "Blue Noise").unwrap()));

        let ssao_out = graph.find_slot_by_name(ssao, "Output").unwrap();
        let final_in = graph.find_slot_by_name(output, "Output").unwrap();
        assert!(graph.connect_slots(ssao_out, final_in));
        assert!(graph.slot(final_in).unwrap().hide_name);

        let report = graph.execute_all_time(output, 1);
        assert_eq!(report.executed, vec![model, attributes, ssao, output]);
        assert!(!graph.node(ssao).unwrap().behavior().needs_update());
    }

    #[test]
    fn test_pass_marks_update() {
        let registry = create_pass_library();
        let mut graph = Graph::new();
        let root = graph.root();
        let lights = graph.create_node(root, &registry, "LIGHT_GROUP", [0.0, 0.0]).unwrap();
        let pbr = graph.create_node(root, &registry, "PBR_RENDERER", [0.0, 0.0]).unwrap();
        let out = graph.find_slot_by_name(lights, "Lights").unwrap();
        let inp = graph.find_slot_by_name(pbr, "Lights").unwrap();
        assert!(graph.connect_slots(out, inp));

        graph.execute_all_time(pbr, 1);
        assert!(!graph.node(pbr).unwrap().behavior().needs_update());

        assert_eq!(graph.notify_slot_update(out), 1);
        assert!(graph.node(pbr).unwrap().behavior().needs_update());
    }

    #[test]
    fn test_scene_merger_takes_many_passes() {
        let registry = create_pass_library();
        let mut graph = Graph::new();
        let root = graph.root();
        let merger = graph.create_node(root, &registry, "SCENE_MERGER", [0.0, 0.0]).unwrap();
        let passes = graph.find_slot_by_name(merger, "Passes").unwrap();
        for _ in 0..3 {
            let renderer = graph.create_node(root, &registry, "MODEL_RENDERER", [0.0, 0.0]).unwrap();
            let pass = graph.find_slot_by_name(renderer, "Pass").unwrap();
            assert!(graph.connect_slots(pass, passes));
        }
        assert_eq!(graph.slot(passes).unwrap().linked_slots().len(), 3);
    }
}
