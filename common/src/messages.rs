//! Definition of tangle node bus messages

use crate::types::*;

/// A block has been attached to the DAG (solid and booked)
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockAttachedMessage {
    /// Attached block
    pub block: BlockId,

    /// Strong parents, in block order
    pub strong_parents: Vec<BlockId>,

    /// Commitment the block was issued against
    pub commitment: CommitmentRef,

    /// Issuing time claimed by the block
    pub issuing_time: Timestamp,
}

/// A block has been accepted by the acceptance gadget
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockAcceptedMessage {
    pub block: BlockId,
    pub issuing_time: Timestamp,
}

/// Accepted time moved
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AcceptedTimeMessage {
    pub time: Timestamp,
}

/// Notarization made an epoch committable
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EpochCommittedMessage {
    pub commitment: CommitmentRef,
}

/// Storage for every epoch up to and including `index` was pruned
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EpochEvictedMessage {
    pub index: EpochIndex,
}

/// Messages consumed from the tangle, acceptance, notarization and pruning
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TangleMessage {
    BlockAttached(BlockAttachedMessage),
    BlockAccepted(BlockAcceptedMessage),
    AcceptedTimeUpdated(AcceptedTimeMessage),
    EpochCommitted(EpochCommittedMessage),
    EpochEvicted(EpochEvictedMessage),
    RootBlockAdded(BlockId),
    RootBlockRemoved(BlockId),
    Shutdown,
}

/// Booker output for a block: its markers
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockBookedMessage {
    pub block: BlockId,
    pub issuing_time: Timestamp,
    pub markers: Vec<Marker>,
}

/// Booker output for a new marker: the block carrying it and its past markers
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarkerBookedMessage {
    pub marker: Marker,
    pub block: BlockId,
    pub issuing_time: Timestamp,
    pub past_markers: Vec<Marker>,
}

/// Marker facts consumed from the booker and acceptance gadget
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BookerMessage {
    BlockBooked(BlockBookedMessage),
    MarkerBooked(MarkerBookedMessage),
    MarkerAccepted(Marker),
}

/// Tip events published by the tip manager
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TipsMessage {
    TipAdded(BlockId),
    TipRemoved(BlockId),
    FutureTipAdded {
        block: BlockId,
        commitment: CommitmentRef,
    },
    FutureTipsPromoted {
        index: EpochIndex,
        blocks: Vec<BlockId>,
    },
    FutureTipsDropped(Vec<BlockId>),
}

// === Global message enum ===
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Message {
    None(()), // Just so we have a simple default

    Tangle(TangleMessage), // Inbound DAG / epoch events
    Booker(BookerMessage), // Inbound marker facts
    Tips(TipsMessage),     // Outbound tip events
}

impl Default for Message {
    fn default() -> Self {
        Self::None(())
    }
}

// Casts from specific messages
impl From<TangleMessage> for Message {
    fn from(msg: TangleMessage) -> Self {
        Message::Tangle(msg)
    }
}

impl From<BookerMessage> for Message {
    fn from(msg: BookerMessage) -> Self {
        Message::Booker(msg)
    }
}

impl From<TipsMessage> for Message {
    fn from(msg: TipsMessage) -> Self {
        Message::Tips(msg)
    }
}
