//! Core type definitions for the tangle node

use crate::{declare_hash_type, hash::Hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an epoch, the unit of commitment and pruning.
pub type EpochIndex = u64;

/// Wall-clock time as used for issuing and accepted times.
pub type Timestamp = DateTime<Utc>;

declare_hash_type!(BlockHash, 32);
declare_hash_type!(
    /// Identifier of an epoch commitment - a 32-byte digest.
    CommitmentId,
    32
);

/// Block identity: content hash plus the epoch the block was issued in.
///
/// Carrying the epoch in the id means pruning can decide from the id alone
/// whether a block belongs to an evicted epoch.
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockId {
    /// Epoch the block was issued in
    pub index: EpochIndex,

    /// Block content hash
    pub hash: BlockHash,
}

/// The genesis sentinel: epoch 0, zero hash.
pub const EMPTY_BLOCK_ID: BlockId = BlockId {
    index: 0,
    hash: Hash::new([0u8; 32]),
};

impl BlockId {
    pub const fn new(hash: BlockHash, index: EpochIndex) -> Self {
        Self { index, hash }
    }

    /// True for the genesis sentinel
    pub fn is_empty(&self) -> bool {
        self.index == 0 && self.hash.is_zero()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// Reference from a block to the epoch commitment it was issued against.
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CommitmentRef {
    /// Committed epoch
    pub index: EpochIndex,

    /// Commitment digest
    pub id: CommitmentId,
}

impl CommitmentRef {
    pub const fn new(index: EpochIndex, id: CommitmentId) -> Self {
        Self { index, id }
    }
}

impl fmt::Display for CommitmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.index)
    }
}

/// Compressed ancestry coordinate assigned by the booker.
///
/// Within one sequence a lower index is always in the past cone of a higher
/// one. `(0, 0)` is the genesis marker.
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Marker {
    pub sequence: u64,
    pub index: u64,
}

impl Marker {
    pub const GENESIS: Marker = Marker {
        sequence: 0,
        index: 0,
    };

    pub const fn new(sequence: u64, index: u64) -> Self {
        Self { sequence, index }
    }

    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sequence, self.index)
    }
}
