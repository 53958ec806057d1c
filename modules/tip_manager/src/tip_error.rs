//! Error types for tip manager operations.

use tangle_common::{BlockId, EpochIndex};

use crate::manager::Lifecycle;

/// Errors returned by [`TipManager`](crate::manager::TipManager) construction and ingestion.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TipManagerError {
    /// The time-since-confirmation threshold is negative or out of range.
    #[error("invalid time-since-confirmation threshold: {threshold}")]
    InvalidThreshold { threshold: String },

    /// The marker walk bound must be a positive integer.
    #[error("invalid max past marker distance: {distance}")]
    InvalidMaxPastMarkerDistance { distance: i64 },

    /// Ingestion outside the `Active` lifecycle state.
    #[error("tip manager is {state}, mutation rejected")]
    NotActive { state: Lifecycle },

    /// The block belongs to an epoch that has already been pruned.
    #[error("block {block} belongs to an evicted epoch (evicted until {last_evicted})")]
    BlockEvicted {
        block: BlockId,
        last_evicted: EpochIndex,
    },

    /// A block was found both in the tip pool and the future tip buffer.
    #[error("block {block} is both a tip and a future tip")]
    InvariantViolation { block: BlockId },
}
