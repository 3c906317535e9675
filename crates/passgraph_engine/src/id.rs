// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifier allocation for nodes, links and slot pins.
//!
//! Node ids and link ids are drawn from a single counter. Pin ids come from
//! the same counter shifted by a fixed offset, so a node id and a pin id can
//! share one integer namespace without ever colliding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Start value of the id counter.
pub const ID_SEED: u32 = 4577;

/// Offset separating pin ids from node and link ids.
pub const PIN_ID_OFFSET: u32 = 0x8000_0000;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Id carried by a node that was not yet added to a graph
    pub const UNASSIGNED: Self = Self(0);

    /// Raw integer value
    pub fn get(self) -> u32 {
        self.0
    }

    /// Whether this id was minted by an allocator
    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a slot pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(pub u32);

impl PinId {
    /// Id carried by a slot that was not yet attached to a node
    pub const UNASSIGNED: Self = Self(0);

    /// Raw integer value
    pub fn get(self) -> u32 {
        self.0
    }

    /// Whether this id was minted by an allocator
    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub u32);

impl LinkId {
    /// Raw integer value
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ids read from files are only adopted this far below the top of the
/// node range; closer ones are re-minted.
pub const ID_HEADROOM: u32 = 1 << 20;

/// Monotonic id source owned by a [`Graph`](crate::Graph).
///
/// The counter is pre-incremented, so the seed itself is never handed out.
/// Node and link ids stay strictly below the pin offset; pin ids are the
/// counter value plus the offset. Allocation returns `None` once the range
/// is used up instead of wrapping into the pin range.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    counter: u32,
    pin_offset: u32,
    max_raw: u32,
    max_adopted: u32,
}

impl IdAllocator {
    /// Create an allocator starting after `seed`
    pub fn new(seed: u32, pin_offset: u32) -> Self {
        let max_raw = pin_offset.saturating_sub(1).min(u32::MAX - pin_offset);
        let span = max_raw.saturating_sub(seed);
        Self {
            counter: seed,
            pin_offset,
            max_raw,
            max_adopted: max_raw - ID_HEADROOM.min(span / 2),
        }
    }

    fn bump(&mut self) -> Option<u32> {
        if self.counter >= self.max_raw {
            return None;
        }
        self.counter += 1;
        Some(self.counter)
    }

    /// Allocate the next node id
    pub fn next_node_id(&mut self) -> Option<NodeId> {
        self.bump().map(NodeId)
    }

    /// Allocate the next link id (shares the node counter)
    pub fn next_link_id(&mut self) -> Option<LinkId> {
        self.bump().map(LinkId)
    }

    /// Allocate the next pin id
    pub fn new_pin_id(&mut self) -> Option<PinId> {
        let pin_offset = self.pin_offset;
        self.bump().map(|raw| PinId(raw + pin_offset))
    }

    /// Whether a node id read from a file may be kept as is
    pub fn can_adopt_node_id(&self, id: NodeId) -> bool {
        id.0 <= self.max_adopted
    }

    /// Whether a pin id read from a file may be kept as is
    pub fn can_adopt_pin_id(&self, id: PinId) -> bool {
        id.0
            .checked_sub(self.pin_offset)
            .is_some_and(|raw| raw <= self.max_adopted)
    }

    /// Advance past a node id read from a file
    pub fn observe_node_id(&mut self, id: NodeId) {
        if self.can_adopt_node_id(id) {
            self.counter = self.counter.max(id.0);
        }
    }

    /// Advance past a pin id read from a file
    pub fn observe_pin_id(&mut self, id: PinId) {
        if self.can_adopt_pin_id(id) {
            self.counter = self.counter.max(id.0 - self.pin_offset);
        }
    }

    /// Whether a raw value lies in the pin id range
    pub fn is_pin_id(&self, raw: u32) -> bool {
        raw >= self.pin_offset
    }

    /// Last value handed out (or the seed)
    pub fn current(&self) -> u32 {
        self.counter
    }

    /// Offset applied to pin ids
    pub fn pin_offset(&self) -> u32 {
        self.pin_offset
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(ID_SEED, PIN_ID_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_monotonic() {
        let mut ids = IdAllocator::default();
        let a = ids.next_node_id().unwrap();
        let b = ids.next_link_id().unwrap();
        let c = ids.next_node_id().unwrap();
        assert_eq!(a.get(), ID_SEED + 1);
        assert!(a.get() < b.get() && b.get() < c.get());
    }

    #[test]
    fn test_node_and_pin_ids_disjoint() {
        let mut ids = IdAllocator::default();
        let mut nodes = HashSet::new();
        let mut pins = HashSet::new();
        for i in 0..500 {
            if i % 3 == 0 {
                pins.insert(ids.new_pin_id().unwrap().get());
            } else {
                nodes.insert(ids.next_node_id().unwrap().get());
            }
        }
        assert!(nodes.is_disjoint(&pins));
        assert!(pins.iter().all(|p| ids.is_pin_id(*p)));
        assert!(nodes.iter().all(|n| !ids.is_pin_id(*n)));
    }

    #[test]
    fn test_observe_advances_counter() {
        let mut ids = IdAllocator::default();
        ids.observe_node_id(NodeId(9000));
        assert_eq!(ids.next_node_id(), Some(NodeId(9001)));

        ids.observe_pin_id(PinId(PIN_ID_OFFSET + 12_000));
        assert_eq!(ids.next_node_id(), Some(NodeId(12_001)));

        // Lower values never move the counter back
        ids.observe_node_id(NodeId(10));
        ids.observe_pin_id(PinId(PIN_ID_OFFSET + 10));
        assert_eq!(ids.current(), 12_001);
    }

    #[test]
    fn test_observe_ignores_foreign_ranges() {
        let mut ids = IdAllocator::default();
        ids.observe_node_id(NodeId(PIN_ID_OFFSET + 5));
        ids.observe_pin_id(PinId(42));
        assert_eq!(ids.current(), ID_SEED);
    }

    #[test]
    fn test_ids_near_the_top_are_not_adopted() {
        let mut ids = IdAllocator::default();
        ids.observe_node_id(NodeId(PIN_ID_OFFSET - 1));
        ids.observe_pin_id(PinId(u32::MAX));
        assert_eq!(ids.current(), ID_SEED);
        assert!(!ids.can_adopt_node_id(NodeId(PIN_ID_OFFSET - 2)));
        assert!(!ids.can_adopt_pin_id(PinId(u32::MAX)));
        assert!(ids.can_adopt_node_id(NodeId(PIN_ID_OFFSET - ID_HEADROOM - 1)));

        // The highest adoptable id still leaves room to allocate
        ids.observe_node_id(NodeId(PIN_ID_OFFSET - ID_HEADROOM - 1));
        let next = ids.next_node_id().unwrap();
        assert!(!ids.is_pin_id(next.get()));
        let pin = ids.new_pin_id().unwrap();
        assert!(ids.is_pin_id(pin.get()));
    }

    #[test]
    fn test_exhausted_range_stops_allocating() {
        let mut ids = IdAllocator::new(90, 100);
        let minted: Vec<NodeId> = std::iter::from_fn(|| ids.next_node_id()).collect();
        assert_eq!(minted.len(), 9);
        assert_eq!(minted.last(), Some(&NodeId(99)));
        assert_eq!(ids.next_link_id(), None);
        assert_eq!(ids.new_pin_id(), None);
    }
}
