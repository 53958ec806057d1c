//! Future tips: blocks waiting for the epoch they commit to.
//!
//! Buckets are keyed by (epoch index, commitment id). A buffered block keeps
//! its strong parents so promotion can replay the same bookkeeping as a
//! direct attachment.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tangle_common::{BlockId, CommitmentId, CommitmentRef, EpochIndex};

type Bucket = HashMap<BlockId, Vec<BlockId>>;

/// Read-only view of the buffer, ordered for stable output.
pub type FutureTipsSnapshot = BTreeMap<EpochIndex, BTreeMap<CommitmentId, BTreeSet<BlockId>>>;

/// Outcome of draining an epoch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Promotion {
    /// Blocks of the committed epoch with their strong parents, by block id
    pub promoted: Vec<(BlockId, Vec<BlockId>)>,

    /// Blocks of older, never-committed buckets
    pub dropped: Vec<BlockId>,
}

#[derive(Default)]
pub struct FutureTipBuffer {
    buckets: BTreeMap<EpochIndex, HashMap<CommitmentId, Bucket>>,
    locations: HashMap<BlockId, CommitmentRef>,
}

impl FutureTipBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `block` under `commitment`. Returns false if it is already
    /// buffered; a block lives in one bucket only.
    pub fn add(&mut self, block: BlockId, commitment: CommitmentRef, parents: Vec<BlockId>) -> bool {
        if self.locations.contains_key(&block) {
            return false;
        }
        self.buckets
            .entry(commitment.index)
            .or_default()
            .entry(commitment.id)
            .or_default()
            .insert(block, parents);
        self.locations.insert(block, commitment);
        true
    }

    pub fn contains(&self, block: &BlockId) -> bool {
        self.locations.contains_key(block)
    }

    /// Commitment the block is buffered under.
    pub fn commitment_of(&self, block: &BlockId) -> Option<CommitmentRef> {
        self.locations.get(block).copied()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Take a block out of its bucket, returning its parents.
    pub fn remove(&mut self, block: &BlockId) -> Option<Vec<BlockId>> {
        let commitment = self.locations.remove(block)?;
        let by_commitment = self.buckets.get_mut(&commitment.index)?;
        let bucket = by_commitment.get_mut(&commitment.id)?;
        let parents = bucket.remove(block);

        if bucket.is_empty() {
            by_commitment.remove(&commitment.id);
        }
        if by_commitment.is_empty() {
            self.buckets.remove(&commitment.index);
        }
        parents
    }

    /// Drain every bucket at `index` for promotion and every bucket below it
    /// for discarding. Newer buckets are untouched.
    pub fn promote_epoch(&mut self, index: EpochIndex) -> Promotion {
        let newer = match index.checked_add(1) {
            Some(next) => self.buckets.split_off(&next),
            None => BTreeMap::new(),
        };
        let drained = std::mem::replace(&mut self.buckets, newer);

        let mut promotion = Promotion::default();
        for (epoch, by_commitment) in drained {
            for bucket in by_commitment.into_values() {
                for (block, parents) in bucket {
                    self.locations.remove(&block);
                    if epoch == index {
                        promotion.promoted.push((block, parents));
                    } else {
                        promotion.dropped.push(block);
                    }
                }
            }
        }

        promotion.promoted.sort_by_key(|(block, _)| *block);
        promotion.dropped.sort();
        promotion
    }

    /// Remove blocks issued in epochs up to and including `index`, except
    /// those `is_root` accepts. Returns the removed blocks.
    pub fn evict_until(
        &mut self,
        index: EpochIndex,
        is_root: impl Fn(&BlockId) -> bool,
    ) -> Vec<BlockId> {
        let mut evicted: Vec<BlockId> = self
            .locations
            .keys()
            .filter(|block| block.index <= index && !is_root(block))
            .copied()
            .collect();
        evicted.sort();
        for block in &evicted {
            self.remove(block);
        }
        evicted
    }

    pub fn snapshot(&self) -> FutureTipsSnapshot {
        self.buckets
            .iter()
            .map(|(epoch, by_commitment)| {
                let commitments = by_commitment
                    .iter()
                    .map(|(id, bucket)| (*id, bucket.keys().copied().collect()))
                    .collect();
                (*epoch, commitments)
            })
            .collect()
    }
}
