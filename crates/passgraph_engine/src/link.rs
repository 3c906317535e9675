// SPDX-License-Identifier: MIT OR Apache-2.0
//! Links between slots and the per-container link table.

use crate::id::{LinkId, PinId};
use crate::slot::SlotRef;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

/// An edge from an output slot to an input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    /// Unique link ID
    pub id: LinkId,
    /// Consumer end
    pub input: SlotRef,
    /// Producer end
    pub output: SlotRef,
}

impl Link {
    /// Create a new link
    pub fn new(id: LinkId, input: SlotRef, output: SlotRef) -> Self {
        Self { id, input, output }
    }

    /// Check if this link touches a pin
    pub fn involves_pin(&self, pin: PinId) -> bool {
        self.input.pin == pin || self.output.pin == pin
    }

    /// Check if this link joins the two slots, in either order
    pub fn joins(&self, a: SlotRef, b: SlotRef) -> bool {
        (self.input == a && self.output == b) || (self.input == b && self.output == a)
    }

    /// The end opposite to `slot`
    pub fn other_end(&self, slot: SlotRef) -> Option<SlotRef> {
        if self.input == slot {
            Some(self.output)
        } else if self.output == slot {
            Some(self.input)
        } else {
            None
        }
    }
}

/// Links owned by one graph container, with a pin → link index.
///
/// The table is the authority on which slots are connected; the index is
/// kept in step on every insert and remove and never holds empty buckets.
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    links: IndexMap<LinkId, Link>,
    by_pin: HashMap<PinId, BTreeSet<LinkId>>,
}

impl LinkTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a link and index it under both pins
    pub fn insert(&mut self, link: Link) {
        self.by_pin.entry(link.input.pin).or_default().insert(link.id);
        self.by_pin.entry(link.output.pin).or_default().insert(link.id);
        self.links.insert(link.id, link);
    }

    /// Remove a link and prune its index buckets
    pub fn remove(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.shift_remove(&id)?;
        for pin in [link.input.pin, link.output.pin] {
            let emptied = match self.by_pin.get_mut(&pin) {
                Some(bucket) => {
                    if !bucket.remove(&id) {
                        tracing::warn!("link {} missing from the index of pin {}", id, pin);
                    }
                    bucket.is_empty()
                }
                None => {
                    tracing::warn!("pin {} has no index bucket for link {}", pin, id);
                    false
                }
            };
            if emptied {
                self.by_pin.remove(&pin);
            }
        }
        Some(link)
    }

    /// Get a link by ID
    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Check if a link exists
    pub fn contains(&self, id: LinkId) -> bool {
        self.links.contains_key(&id)
    }

    /// Snapshot of the link ids touching a pin
    pub fn ids_for_pin(&self, pin: PinId) -> Vec<LinkId> {
        self.by_pin
            .get(&pin)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Raw index bucket of a pin
    pub fn index_bucket(&self, pin: PinId) -> Option<&BTreeSet<LinkId>> {
        self.by_pin.get(&pin)
    }

    /// Every indexed pin with its bucket
    pub fn index(&self) -> impl Iterator<Item = (PinId, &BTreeSet<LinkId>)> {
        self.by_pin.iter().map(|(pin, bucket)| (*pin, bucket))
    }

    /// Find the link joining two slots
    pub fn link_between(&self, a: SlotRef, b: SlotRef) -> Option<&Link> {
        let bucket = self.by_pin.get(&a.pin)?;
        bucket
            .iter()
            .filter_map(|id| self.links.get(id))
            .find(|link| link.joins(a, b))
    }

    /// Get all links in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Get all link IDs
    pub fn ids(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.links.keys().copied()
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if there are no links
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Drop every link
    pub fn clear(&mut self) {
        self.links.clear();
        self.by_pin.clear();
    }
}
