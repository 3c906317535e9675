// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration, stored as RON.

use crate::error::{GraphError, Result};
use crate::id::{IdAllocator, ID_SEED, PIN_ID_OFFSET};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "passgraph.ron";

/// Smallest number of node ids a configuration must leave below the pin range
pub const MIN_ID_SPAN: u32 = 1024;

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start value of the id counter
    pub id_seed: u32,
    /// Offset separating pin ids from node ids
    pub pin_id_offset: u32,
    /// Canvas scale given to new graph nodes
    pub default_canvas_scale: f32,
    /// Indentation unit used when writing XML
    pub xml_indent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_seed: ID_SEED,
            pin_id_offset: PIN_ID_OFFSET,
            default_canvas_scale: 1.0,
            xml_indent: "\t".to_string(),
        }
    }
}

impl EngineConfig {
    /// Check that the values can drive an [`IdAllocator`]
    pub fn validate(&self) -> Result<()> {
        if self.pin_id_offset <= self.id_seed {
            return Err(GraphError::InvalidConfig(format!(
                "pin_id_offset ({}) must be greater than id_seed ({})",
                self.pin_id_offset, self.id_seed
            )));
        }
        if self.pin_id_offset - self.id_seed < MIN_ID_SPAN {
            return Err(GraphError::InvalidConfig(format!(
                "id_seed ({}) leaves fewer than {} ids below pin_id_offset ({})",
                self.id_seed, MIN_ID_SPAN, self.pin_id_offset
            )));
        }
        if self.pin_id_offset > PIN_ID_OFFSET {
            return Err(GraphError::InvalidConfig(format!(
                "pin_id_offset ({}) must not exceed {}",
                self.pin_id_offset, PIN_ID_OFFSET
            )));
        }
        if let Some(unit) = self.xml_indent.chars().next() {
            if !unit.is_ascii_whitespace() || self.xml_indent.chars().any(|c| c != unit) {
                return Err(GraphError::InvalidConfig(format!(
                    "xml_indent ({:?}) must repeat a single space or tab",
                    self.xml_indent
                )));
            }
        }
        if self.default_canvas_scale.is_nan() || self.default_canvas_scale <= 0.0 {
            return Err(GraphError::InvalidConfig(format!(
                "default_canvas_scale ({}) must be positive",
                self.default_canvas_scale
            )));
        }
        Ok(())
    }

    /// Build the allocator described by this configuration
    pub fn allocator(&self) -> IdAllocator {
        IdAllocator::new(self.id_seed, self.pin_id_offset)
    }

    /// Parse and validate a RON string
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: EngineConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}
