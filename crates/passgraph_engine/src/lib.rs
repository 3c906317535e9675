// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph engine for `PassGraph`.
//!
//! Nodes own typed input and output slots. Links join an output slot to an
//! input slot of a sibling node and are recorded in the link table of the
//! graph node that contains both.
//!
//! ## Architecture
//!
//! - [`Graph`] owns every node in an arena and hands out id-based handles
//! - Connecting and breaking links goes through one protocol that keeps
//!   slot caches, link tables and node hooks in step
//! - Notifications travel along links, one hop or transitively
//! - Graphs persist to XML (and RON) with id remapping on load

pub mod codegen;
pub mod config;
pub mod document;
pub mod error;
pub mod execution;
pub mod graph;
pub mod id;
pub mod library;
pub mod link;
pub mod node;
pub mod notify;
pub mod protocol;
pub mod slot;
pub mod xml;

pub use codegen::SlotSignature;
pub use config::EngineConfig;
pub use document::GraphDocument;
pub use error::{GraphError, Result};
pub use execution::ExecutionReport;
pub use graph::{Graph, OutputButton};
pub use id::{LinkId, NodeId, PinId};
pub use library::create_pass_library;
pub use link::Link;
pub use node::{Node, NodeBehavior, NodeRegistry, NodeType};
pub use notify::NotifyEvent;
pub use protocol::ConsistencyIssue;
pub use slot::{Slot, SlotKind, SlotPlace, SlotRef};
