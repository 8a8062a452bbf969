//! Ordered, deduplicated queue of pending lots.
//!
//! Insertion order is auction order. A partially sold lot goes back on the
//! front so it re-runs before new items. Eligibility is the engine's concern;
//! this structure only keeps ids ordered and distinct.

use crate::types::ProductId;
use std::collections::VecDeque;

/// FIFO of distinct product ids awaiting their clock run.
#[derive(Clone, Debug, Default)]
pub struct AuctionQueue {
    items: VecDeque<ProductId>,
}

impl AuctionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` unless already queued. Returns whether it was added.
    pub fn push_back(&mut self, id: ProductId) -> bool {
        if self.items.contains(&id) {
            return false;
        }
        self.items.push_back(id);
        true
    }

    /// Puts `id` at the head (partial-lot re-auction). An existing entry is
    /// moved rather than duplicated.
    pub fn push_front(&mut self, id: ProductId) {
        self.items.retain(|queued| *queued != id);
        self.items.push_front(id);
    }

    /// Pops the next lot to auction.
    pub fn pop_front(&mut self) -> Option<ProductId> {
        self.items.pop_front()
    }

    /// Removes `id` if present. Idempotent; returns whether anything changed.
    pub fn remove(&mut self, id: ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|queued| *queued != id);
        self.items.len() != before
    }

    pub fn contains(&self, id: ProductId) -> bool {
        self.items.contains(&id)
    }

    pub fn ids(&self) -> Vec<ProductId> {
        self.items.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
