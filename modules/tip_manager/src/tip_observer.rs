//! Observer trait for tip manager events.

use tangle_common::{BlockId, CommitmentRef, EpochIndex};

/// Callback receiver for tip manager events.
///
/// Registered once at construction. Callbacks run after the tip manager
/// has released its lock, in the order the mutations happened, so a parent's
/// `tip_removed` always precedes its child's `tip_added`.
pub trait TipManagerObserver {
    /// A block entered the tip pool.
    fn tip_added(&self, block: BlockId);

    /// A block left the tip pool (referenced, evicted or TSC-invalid).
    fn tip_removed(&self, block: BlockId);

    /// A block was filed under a not yet committable commitment.
    fn future_tip_added(&self, block: BlockId, commitment: CommitmentRef);

    /// Buckets of epoch `index` were drained into the pool.
    fn future_tips_promoted(&self, index: EpochIndex, blocks: &[BlockId]);

    /// Buffered blocks were discarded without promotion.
    fn future_tips_dropped(&self, blocks: &[BlockId]);
}

impl<T: TipManagerObserver + ?Sized> TipManagerObserver for std::sync::Arc<T> {
    fn tip_added(&self, block: BlockId) {
        (**self).tip_added(block)
    }

    fn tip_removed(&self, block: BlockId) {
        (**self).tip_removed(block)
    }

    fn future_tip_added(&self, block: BlockId, commitment: CommitmentRef) {
        (**self).future_tip_added(block, commitment)
    }

    fn future_tips_promoted(&self, index: EpochIndex, blocks: &[BlockId]) {
        (**self).future_tips_promoted(index, blocks)
    }

    fn future_tips_dropped(&self, blocks: &[BlockId]) {
        (**self).future_tips_dropped(blocks)
    }
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl TipManagerObserver for NoOpObserver {
    fn tip_added(&self, _: BlockId) {}
    fn tip_removed(&self, _: BlockId) {}
    fn future_tip_added(&self, _: BlockId, _: CommitmentRef) {}
    fn future_tips_promoted(&self, _: EpochIndex, _: &[BlockId]) {}
    fn future_tips_dropped(&self, _: &[BlockId]) {}
}
