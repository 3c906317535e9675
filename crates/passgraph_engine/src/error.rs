// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error type for persistence and configuration.
//!
//! Connection and lookup operations never return these: they report through
//! `bool` / `Option` and log the reason.

use crate::id::NodeId;
use thiserror::Error;

/// Errors raised while loading, saving or configuring a graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// XML syntax error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed XML attribute
    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    /// Written XML was not valid UTF-8
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// RON parse error
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// RON serialization error
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document is well-formed but does not describe a graph
    #[error("Malformed graph document: {0}")]
    Malformed(String),

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}

/// Result type for graph persistence operations
pub type Result<T> = std::result::Result<T, GraphError>;
