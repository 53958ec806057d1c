//! Root block registry and epoch eviction boundary.
//!
//! Root blocks are grouped by the epoch they belong to. They are the
//! bootstrapping anchors of the tangle: always valid parents, never evicted
//! by the tip manager even when their epoch is pruned.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use tangle_common::{BlockId, EpochIndex, EMPTY_BLOCK_ID};
use tracing::{debug, info};

#[derive(Default)]
struct RootBlocks {
    by_epoch: BTreeMap<EpochIndex, HashSet<BlockId>>,
    last_evicted: Option<EpochIndex>,
}

/// Shared root block set and eviction boundary.
pub struct EvictionState {
    inner: RwLock<RootBlocks>,
}

impl EvictionState {
    /// A registry holding only the genesis sentinel.
    pub fn new() -> Self {
        let state = Self::empty();
        state.add_root_block(EMPTY_BLOCK_ID);
        state
    }

    /// A registry with no root blocks at all.
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(RootBlocks::default()),
        }
    }

    pub fn add_root_block(&self, block: BlockId) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.by_epoch.entry(block.index).or_default().insert(block) {
            debug!("Root block {block} added");
        }
    }

    /// Returns true if the block was a root block.
    pub fn remove_root_block(&self, block: &BlockId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let Some(blocks) = inner.by_epoch.get_mut(&block.index) else {
            return false;
        };
        let removed = blocks.remove(block);
        if blocks.is_empty() {
            inner.by_epoch.remove(&block.index);
        }
        if removed {
            debug!("Root block {block} removed");
        }
        removed
    }

    pub fn is_root_block(&self, block: &BlockId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .by_epoch
            .get(&block.index)
            .is_some_and(|blocks| blocks.contains(block))
    }

    /// All root blocks, newest epoch first. Order inside an epoch is by id.
    pub fn root_blocks(&self) -> Vec<BlockId> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_epoch
            .values()
            .rev()
            .flat_map(|blocks| {
                let mut sorted: Vec<BlockId> = blocks.iter().copied().collect();
                sorted.sort();
                sorted
            })
            .collect()
    }

    /// A root block from the newest epoch that has one.
    pub fn latest_root_block(&self) -> Option<BlockId> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_epoch.values().next_back().and_then(|blocks| blocks.iter().min().copied())
    }

    /// Record that every epoch up to and including `index` was pruned.
    /// Root blocks are kept; the boundary only ever moves forward.
    pub fn evict_until(&self, index: EpochIndex) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.last_evicted.is_some_and(|last| last >= index) {
            debug!("Eviction until {index} is not beyond the current boundary");
            return;
        }
        inner.last_evicted = Some(index);
        info!("Evicted epochs until {index}");
    }

    pub fn last_evicted_epoch(&self) -> Option<EpochIndex> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).last_evicted
    }

    /// True if the epoch of `block` is at or below the eviction boundary.
    pub fn is_evicted(&self, block: &BlockId) -> bool {
        self.last_evicted_epoch().is_some_and(|last| block.index <= last)
    }
}

impl Default for EvictionState {
    fn default() -> Self {
        Self::new()
    }
}
