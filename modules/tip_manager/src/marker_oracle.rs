//! Marker oracle: read access to booker output and acceptance state.
//!
//! The booker assigns markers and the acceptance gadget decides what is
//! accepted; the tip manager only reads those facts. [`MarkerCache`] is the
//! in-memory implementation fed from the bus and pruned per epoch.

use std::sync::RwLock;

use dashmap::DashMap;
use tangle_common::{BlockId, EpochIndex, Marker, Timestamp};
use tracing::debug;

/// What the oracle knows about a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMetadata {
    pub issuing_time: Timestamp,
    /// Latest markers in the block's past cone, one per sequence it touches.
    pub markers: Vec<Marker>,
    pub accepted: bool,
}

/// What the oracle knows about a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMetadata {
    /// Block carrying the marker
    pub block: BlockId,
    pub issuing_time: Timestamp,
    /// Markers directly referenced by this marker's past cone
    pub past_markers: Vec<Marker>,
    /// Accepted directly or through a later accepted marker of its sequence
    pub accepted: bool,
}

/// Lookup failures.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("unknown marker {0}")]
    UnknownMarker(Marker),

    #[error("block {block} was evicted with its epoch")]
    Evicted { block: BlockId },

    #[error("marker {0} was evicted with its epoch")]
    MarkerEvicted(Marker),
}

/// Marker and acceptance lookups used by TSC evaluation.
pub trait MarkerOracle: Send + Sync {
    fn block_metadata(&self, block: &BlockId) -> Result<BlockMetadata, OracleError>;

    fn marker_metadata(&self, marker: &Marker) -> Result<MarkerMetadata, OracleError>;

    /// Acceptance survives eviction of the marker's metadata.
    fn is_marker_accepted(&self, marker: &Marker) -> bool;
}

/// In-memory marker oracle.
///
/// Marker acceptance is tracked as the highest accepted index per sequence:
/// accepting `(s, i)` implies every `(s, j)` with `j <= i` is accepted.
/// Eviction is tracked the same way, as the highest pruned index per
/// sequence, so a pruned marker can be told apart from an unknown one.
#[derive(Default)]
pub struct MarkerCache {
    blocks: DashMap<BlockId, BlockMetadata>,
    markers: DashMap<Marker, MarkerMetadata>,
    accepted_sequences: DashMap<u64, u64>,
    evicted_sequences: DashMap<u64, u64>,
    evicted_until: RwLock<Option<EpochIndex>>,
}

impl MarkerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the booker's markers for a block. Re-booking keeps acceptance.
    pub fn book_block(&self, block: BlockId, issuing_time: Timestamp, markers: Vec<Marker>) {
        let accepted = self.blocks.get(&block).is_some_and(|meta| meta.accepted);
        self.blocks.insert(
            block,
            BlockMetadata {
                issuing_time,
                markers,
                accepted,
            },
        );
    }

    /// Record a newly assigned marker.
    pub fn book_marker(
        &self,
        marker: Marker,
        block: BlockId,
        issuing_time: Timestamp,
        past_markers: Vec<Marker>,
    ) {
        self.markers.insert(
            marker,
            MarkerMetadata {
                block,
                issuing_time,
                past_markers,
                accepted: false,
            },
        );
    }

    /// Mark a block accepted. Returns false if the block is unknown.
    pub fn set_block_accepted(&self, block: &BlockId) -> bool {
        match self.blocks.get_mut(block) {
            Some(mut meta) => {
                meta.accepted = true;
                true
            }
            None => {
                debug!("Acceptance for unknown block {block}");
                false
            }
        }
    }

    /// Mark a marker (and every earlier marker of its sequence) accepted.
    pub fn set_marker_accepted(&self, marker: Marker) {
        self.accepted_sequences
            .entry(marker.sequence)
            .and_modify(|index| *index = (*index).max(marker.index))
            .or_insert(marker.index);
    }

    /// Drop everything belonging to epochs up to and including `index`.
    pub fn evict_until(&self, index: EpochIndex) {
        {
            let mut evicted = self.evicted_until.write().unwrap_or_else(|e| e.into_inner());
            if evicted.is_some_and(|current| current >= index) {
                return;
            }
            *evicted = Some(index);
        }

        let blocks_before = self.blocks.len();
        self.blocks.retain(|block, _| block.index > index);
        self.markers.retain(|marker, meta| {
            if meta.block.index > index {
                return true;
            }
            self.evicted_sequences
                .entry(marker.sequence)
                .and_modify(|evicted| *evicted = (*evicted).max(marker.index))
                .or_insert(marker.index);
            false
        });
        debug!(
            "Marker cache evicted until epoch {index}, dropped {} blocks",
            blocks_before - self.blocks.len()
        );
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn is_evicted(&self, block: &BlockId) -> bool {
        self.evicted_until
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|until| block.index <= until)
    }

    fn is_marker_evicted(&self, marker: &Marker) -> bool {
        self.evicted_sequences.get(&marker.sequence).is_some_and(|index| marker.index <= *index)
    }
}

impl MarkerOracle for MarkerCache {
    fn block_metadata(&self, block: &BlockId) -> Result<BlockMetadata, OracleError> {
        if let Some(meta) = self.blocks.get(block) {
            return Ok(meta.clone());
        }
        if self.is_evicted(block) {
            return Err(OracleError::Evicted { block: *block });
        }
        Err(OracleError::UnknownBlock(*block))
    }

    fn marker_metadata(&self, marker: &Marker) -> Result<MarkerMetadata, OracleError> {
        let Some(mut meta) = self.markers.get(marker).map(|meta| meta.clone()) else {
            if self.is_marker_evicted(marker) {
                return Err(OracleError::MarkerEvicted(*marker));
            }
            return Err(OracleError::UnknownMarker(*marker));
        };
        meta.accepted = self.is_marker_accepted(marker);
        Ok(meta)
    }

    fn is_marker_accepted(&self, marker: &Marker) -> bool {
        self.accepted_sequences.get(&marker.sequence).is_some_and(|index| marker.index <= *index)
    }
}
