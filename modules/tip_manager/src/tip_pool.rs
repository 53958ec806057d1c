//! The tip pool: blocks with no known child.
//!
//! Not synchronised; the tip manager owns it behind its state lock. The tip
//! set is a persistent `imbl` set so readers can take a snapshot in O(1) and
//! run TSC checks without holding the lock.

use std::collections::HashSet;

use tangle_common::{BlockId, EpochIndex};

#[derive(Default)]
pub struct TipPool {
    tips: imbl::HashSet<BlockId>,
    /// Blocks referenced as a strong parent by some processed block
    consumed: HashSet<BlockId>,
    added_total: u64,
    removed_total: u64,
}

impl TipPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tip. Returns false if it is already a tip or already has a
    /// known child.
    pub fn add_tip(&mut self, block: BlockId) -> bool {
        if self.consumed.contains(&block) || self.tips.contains(&block) {
            return false;
        }
        self.tips.insert(block);
        self.added_total += 1;
        true
    }

    /// Record that `parent` now has a child. Returns true if it was a tip and
    /// has been removed; removing a non-tip is silent.
    pub fn remove_tip(&mut self, parent: BlockId) -> bool {
        self.consumed.insert(parent);
        self.drop_tip(&parent)
    }

    /// Remove a tip without marking it consumed (stale or evicted).
    pub fn discard(&mut self, block: &BlockId) -> bool {
        self.drop_tip(block)
    }

    fn drop_tip(&mut self, block: &BlockId) -> bool {
        if self.tips.remove(block).is_some() {
            self.removed_total += 1;
            true
        } else {
            false
        }
    }

    pub fn contains(&self, block: &BlockId) -> bool {
        self.tips.contains(block)
    }

    /// True if some processed block references `block` as a parent.
    pub fn has_children(&self, block: &BlockId) -> bool {
        self.consumed.contains(block)
    }

    pub fn len(&self) -> usize {
        self.tips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tips.is_empty()
    }

    /// Cheap structural-sharing copy of the current tips.
    pub fn snapshot(&self) -> imbl::HashSet<BlockId> {
        self.tips.clone()
    }

    pub fn added_total(&self) -> u64 {
        self.added_total
    }

    pub fn removed_total(&self) -> u64 {
        self.removed_total
    }

    /// Drop tips and child bookkeeping for epochs up to and including
    /// `index`, keeping anything `is_root` accepts. Returns the removed tips.
    pub fn evict_until(
        &mut self,
        index: EpochIndex,
        is_root: impl Fn(&BlockId) -> bool,
    ) -> Vec<BlockId> {
        let mut evicted: Vec<BlockId> = self
            .tips
            .iter()
            .filter(|block| block.index <= index && !is_root(block))
            .copied()
            .collect();
        evicted.sort();
        for block in &evicted {
            self.drop_tip(block);
        }
        self.consumed.retain(|block| block.index > index || is_root(block));
        evicted
    }
}
