// SPDX-License-Identifier: MIT OR Apache-2.0
//! Slot definitions: the typed connection points owned by nodes.

use crate::document::SlotRecord;
use crate::id::{NodeId, PinId};
use crate::notify::NotifyEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a node a slot sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SlotPlace {
    /// Not attached yet
    #[default]
    None,
    /// Consumer side
    Input,
    /// Producer side
    Output,
}

impl SlotPlace {
    /// Tag used in saved graphs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }

    /// Parse a saved tag; unknown tags map to [`SlotPlace::None`]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "INPUT" => Self::Input,
            "OUTPUT" => Self::Output,
            _ => Self::None,
        }
    }

    /// The facing place
    pub fn opposite(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

impl fmt::Display for SlotPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar type carried by a widget/variable slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    /// Boolean widget
    Boolean,
    /// Signed integer widget
    Int,
    /// Unsigned integer widget
    UInt,
    /// Float widget
    Float,
}

/// What a connected producer and consumer exchange.
///
/// The string tag is what decides compatibility; the kind only classifies
/// known tags so nodes can react per capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    /// 2D texture
    Texture2D,
    /// 3D texture
    Texture3D,
    /// Cube map
    TextureCube,
    /// Group of 2D textures
    TextureGroup,
    /// Storage buffer
    StorageBuffer,
    /// Texel buffer
    TexelBuffer,
    /// Mesh / model
    Model,
    /// Group of lights
    LightGroup,
    /// Widget variable
    Variable(VariableKind),
    /// Ray tracing acceleration structure
    AccelStructure,
    /// Shader pass
    ShaderPass,
    /// Execution ordering
    Task,
    /// Any other tag
    Custom(String),
}

impl SlotKind {
    /// Slot type tag for this kind
    pub fn tag(&self) -> &str {
        match self {
            Self::Texture2D => "TEXTURE_2D",
            Self::Texture3D => "TEXTURE_3D",
            Self::TextureCube => "TEXTURE_CUBE",
            Self::TextureGroup => "TEXTURE_2D_GROUP",
            Self::StorageBuffer => "STORAGE_BUFFER",
            Self::TexelBuffer => "TEXEL_BUFFER",
            Self::Model => "MESH",
            Self::LightGroup => "LIGHT_GROUP",
            Self::Variable(VariableKind::Boolean) => "WIDGET_BOOLEAN",
            Self::Variable(VariableKind::Int) => "WIDGET_INT",
            Self::Variable(VariableKind::UInt) => "WIDGET_UINT",
            Self::Variable(VariableKind::Float) => "WIDGET_FLOAT",
            Self::AccelStructure => "RTX_ACCEL_STRUCTURE",
            Self::ShaderPass => "SHADER_PASS",
            Self::Task => "TASK",
            Self::Custom(tag) => tag,
        }
    }

    /// Classify a slot type tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "TEXTURE_2D" => Self::Texture2D,
            "TEXTURE_3D" => Self::Texture3D,
            "TEXTURE_CUBE" => Self::TextureCube,
            "TEXTURE_2D_GROUP" => Self::TextureGroup,
            "STORAGE_BUFFER" => Self::StorageBuffer,
            "TEXEL_BUFFER" => Self::TexelBuffer,
            "MESH" => Self::Model,
            "LIGHT_GROUP" => Self::LightGroup,
            "WIDGET_BOOLEAN" => Self::Variable(VariableKind::Boolean),
            "WIDGET_INT" => Self::Variable(VariableKind::Int),
            "WIDGET_UINT" => Self::Variable(VariableKind::UInt),
            "WIDGET_FLOAT" => Self::Variable(VariableKind::Float),
            "RTX_ACCEL_STRUCTURE" => Self::AccelStructure,
            "SHADER_PASS" => Self::ShaderPass,
            "TASK" => Self::Task,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Event a producer of this kind emits when its data changed
    pub fn update_event(&self) -> Option<NotifyEvent> {
        match self {
            Self::Texture2D | Self::Texture3D | Self::TextureCube => {
                Some(NotifyEvent::TextureUpdateDone)
            }
            Self::TextureGroup => Some(NotifyEvent::TextureGroupUpdateDone),
            Self::StorageBuffer => Some(NotifyEvent::StorageBufferUpdateDone),
            Self::TexelBuffer => Some(NotifyEvent::TexelBufferUpdateDone),
            Self::Model => Some(NotifyEvent::ModelUpdateDone),
            Self::LightGroup => Some(NotifyEvent::LightGroupUpdateDone),
            Self::Variable(_) => Some(NotifyEvent::VariableUpdateDone),
            Self::AccelStructure => Some(NotifyEvent::AccelStructureUpdateDone),
            Self::ShaderPass => Some(NotifyEvent::ShaderPassUpdateDone),
            Self::Task => Some(NotifyEvent::SomeTasksWasUpdated),
            Self::Custom(_) => None,
        }
    }
}

/// Non-owning handle to a slot.
///
/// Resolving it through the graph yields `None` once the slot or its node
/// is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    /// Owning node
    pub node: NodeId,
    /// Slot pin
    pub pin: PinId,
}

impl SlotRef {
    /// Create a handle
    pub fn new(node: NodeId, pin: PinId) -> Self {
        Self { node, pin }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.pin)
    }
}

/// Owned snapshot of a slot handed to node behaviour hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// Handle of the slot
    pub slot: SlotRef,
    /// Slot name
    pub name: String,
    /// Slot type tag
    pub slot_type: String,
    /// Input or output
    pub place: SlotPlace,
    /// Position among siblings
    pub index: u32,
    /// Whether several links may end on this input
    pub accept_many_inputs: bool,
    /// Binding point used by the pass machinery
    pub descriptor_binding: u32,
}

impl SlotInfo {
    /// Capability of the slot
    pub fn kind(&self) -> SlotKind {
        SlotKind::from_tag(&self.slot_type)
    }
}

/// A typed connection point owned by exactly one node
#[derive(Debug, Clone)]
pub struct Slot {
    pin_id: PinId,
    /// Slot name
    pub name: String,
    /// Position among siblings of the same place
    pub index: u32,
    /// Type tag; equal tags are the compatibility rule
    pub slot_type: String,
    /// Input or output
    pub place: SlotPlace,
    /// Whether several links may end on this input
    pub accept_many_inputs: bool,
    /// Hide the name when drawn
    pub hide_name: bool,
    /// Draw an inline widget
    pub show_widget: bool,
    /// Binding point used by the pass machinery
    pub descriptor_binding: u32,
    /// Tooltip text
    pub help: String,
    connected: bool,
    linked_slots: Vec<SlotRef>,
    parent: Option<NodeId>,
    already_set_by_file: bool,
    saved_index: bool,
}

impl Slot {
    /// Create a detached slot
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>, place: SlotPlace) -> Self {
        Self {
            pin_id: PinId::UNASSIGNED,
            name: name.into(),
            index: 0,
            slot_type: slot_type.into(),
            place,
            accept_many_inputs: false,
            hide_name: false,
            show_widget: false,
            descriptor_binding: 0,
            help: String::new(),
            connected: false,
            linked_slots: Vec::new(),
            parent: None,
            already_set_by_file: false,
            saved_index: false,
        }
    }

    /// Create a detached input slot
    pub fn input(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self::new(name, slot_type, SlotPlace::Input)
    }

    /// Create a detached output slot
    pub fn output(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self::new(name, slot_type, SlotPlace::Output)
    }

    /// Create a slot from a capability kind
    pub fn from_kind(name: impl Into<String>, kind: &SlotKind, place: SlotPlace) -> Self {
        Self::new(name, kind.tag(), place)
    }

    /// Rebuild a detached slot from a saved record, keeping its pin id
    pub fn from_record(record: &SlotRecord) -> Self {
        let mut slot = Self::new(record.name.clone(), record.slot_type.clone(), record.place);
        slot.index = record.index;
        slot.pin_id = record.id;
        slot.saved_index = true;
        slot
    }

    /// Allow several links on this input
    pub fn accept_many_inputs(mut self) -> Self {
        self.accept_many_inputs = true;
        self
    }

    /// Set the descriptor binding point
    pub fn with_binding(mut self, binding: u32) -> Self {
        self.descriptor_binding = binding;
        self
    }

    /// Hide the slot name when drawn
    pub fn hidden_name(mut self) -> Self {
        self.hide_name = true;
        self
    }

    /// Draw an inline widget for this slot
    pub fn with_widget(mut self) -> Self {
        self.show_widget = true;
        self
    }

    /// Set the tooltip text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Use a caller-supplied pin id instead of minting one on attach
    pub fn with_pin_id(mut self, pin: PinId) -> Self {
        self.pin_id = pin;
        self
    }

    /// Pin id of this slot
    pub fn pin_id(&self) -> PinId {
        self.pin_id
    }

    /// Owning node, once attached
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Handle to this slot, once attached
    pub fn slot_ref(&self) -> Option<SlotRef> {
        self.parent.map(|node| SlotRef::new(node, self.pin_id))
    }

    /// Whether at least one link ends on this slot
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Partner slots of every link touching this slot
    pub fn linked_slots(&self) -> &[SlotRef] {
        &self.linked_slots
    }

    /// Whether the pin id was taken from a saved file
    pub fn already_set_by_file(&self) -> bool {
        self.already_set_by_file
    }

    /// Input side check
    pub fn is_input(&self) -> bool {
        self.place == SlotPlace::Input
    }

    /// Output side check
    pub fn is_output(&self) -> bool {
        self.place == SlotPlace::Output
    }

    /// Capability of the slot
    pub fn kind(&self) -> SlotKind {
        SlotKind::from_tag(&self.slot_type)
    }

    /// Snapshot for behaviour hooks
    pub fn info(&self) -> Option<SlotInfo> {
        Some(SlotInfo {
            slot: self.slot_ref()?,
            name: self.name.clone(),
            slot_type: self.slot_type.clone(),
            place: self.place,
            index: self.index,
            accept_many_inputs: self.accept_many_inputs,
            descriptor_binding: self.descriptor_binding,
        })
    }

    /// Rebuilt from a record: the saved index wins over the next free one
    pub(crate) fn keeps_saved_index(&self) -> bool {
        self.saved_index
    }

    pub(crate) fn attach(&mut self, parent: NodeId, place: SlotPlace, index: u32, pin: PinId) {
        self.parent = Some(parent);
        self.place = place;
        self.index = index;
        self.pin_id = pin;
    }

    pub(crate) fn add_connected_slot(&mut self, other: SlotRef) {
        self.linked_slots.push(other);
        self.connected = true;
    }

    /// Drop one cached partner. A miss means the link table and this cache
    /// disagree; it is logged and reported as `false`.
    pub(crate) fn remove_connected_slot(&mut self, other: SlotRef) -> bool {
        match self.linked_slots.iter().position(|s| *s == other) {
            Some(pos) => {
                self.linked_slots.remove(pos);
                if self.linked_slots.is_empty() {
                    self.connected = false;
                }
                true
            }
            None => {
                tracing::warn!(
                    "slot {} ({}) has no cached connection to slot {}",
                    self.pin_id,
                    self.name,
                    other
                );
                false
            }
        }
    }

    /// Record written to saved graphs
    pub fn to_record(&self) -> SlotRecord {
        SlotRecord {
            index: self.index,
            name: self.name.clone(),
            slot_type: self.slot_type.clone(),
            place: self.place,
            id: self.pin_id,
        }
    }

    /// Whether a saved record describes this slot
    pub fn matches_record(&self, record: &SlotRecord) -> bool {
        self.index == record.index && self.slot_type == record.slot_type && self.place == record.place
    }

    /// Adopt the pin id of a matching record, at most once per load.
    ///
    /// Returns `true` when the pin id was taken from the record. The caller
    /// re-keys whatever map holds the slot.
    pub(crate) fn apply_record(&mut self, record: &SlotRecord) -> bool {
        if self.already_set_by_file || !self.matches_record(record) {
            return false;
        }
        debug_assert!(!self.connected, "reconciling a slot that is already linked");
        self.pin_id = record.id;
        self.already_set_by_file = true;
        true
    }
}
