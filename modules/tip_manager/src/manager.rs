//! Tip manager façade.
//!
//! Owns the tip pool and the future tip buffer behind one lock, since a block
//! may be in at most one of them. Marker oracle lookups are made before the
//! lock is taken, and observer callbacks after it is released.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::seq::SliceRandom;
use tangle_common::messages::{BlockAcceptedMessage, BlockAttachedMessage};
use tangle_common::{BlockId, CommitmentRef, EpochIndex, Timestamp};
use tracing::{debug, error, info, warn};

use crate::configuration::TipManagerConfig;
use crate::eviction::EvictionState;
use crate::future_tips::{FutureTipBuffer, FutureTipsSnapshot};
use crate::marker_oracle::MarkerOracle;
use crate::tip_error::TipManagerError;
use crate::tip_observer::TipManagerObserver;
use crate::tip_pool::TipPool;
use crate::tsc::TscValidator;

/// Engine lifecycle of the tip manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, ingestion rejected
    Uninitialized,
    /// Processing events
    Active,
    /// Pool frozen, queries only
    ShuttingDown,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Uninitialized => write!(f, "uninitialized"),
            Lifecycle::Active => write!(f, "active"),
            Lifecycle::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// What happened to an attached block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Added to the tip pool
    Tip,
    /// Filed under a not yet committable commitment
    FutureTip,
    /// Parents consumed, block itself rejected by the TSC rule
    TscInvalid,
    /// Already known, or already referenced by another block
    Ignored,
}

/// Events gathered under the lock and dispatched after it is released.
enum TipEvent {
    TipAdded(BlockId),
    TipRemoved(BlockId),
    FutureTipAdded(BlockId, CommitmentRef),
    FutureTipsPromoted(EpochIndex, Vec<BlockId>),
    FutureTipsDropped(Vec<BlockId>),
}

struct TipState {
    lifecycle: Lifecycle,
    pool: TipPool,
    future_tips: FutureTipBuffer,
    latest_commitment: Option<CommitmentRef>,
}

impl TipState {
    /// Latest committable epoch; the genesis epoch counts as committed.
    fn latest_committable_epoch(&self) -> EpochIndex {
        self.latest_commitment.map_or(0, |commitment| commitment.index)
    }

    /// Remove `parents` from the pool, recording removals.
    fn consume_parents(&mut self, parents: &[BlockId], events: &mut Vec<TipEvent>) {
        for parent in parents {
            if self.pool.remove_tip(*parent) {
                debug!("Tip {parent} referenced, removed");
                events.push(TipEvent::TipRemoved(*parent));
            }
        }
    }

    /// A block must never be both a tip and a future tip. The pool wins.
    fn check_exclusive(&mut self, block: &BlockId) -> Result<(), TipManagerError> {
        let both = self.pool.contains(block) && self.future_tips.contains(block);
        if both {
            error!("Block {block} is both a tip and a future tip, dropping buffered copy");
            self.future_tips.remove(block);
            return Err(TipManagerError::InvariantViolation { block: *block });
        }
        Ok(())
    }
}

/// The tip manager.
pub struct TipManager {
    state: RwLock<TipState>,
    tsc: TscValidator,
    eviction: Arc<EvictionState>,
    observer: Box<dyn TipManagerObserver + Send + Sync>,
}

impl TipManager {
    pub fn new(
        config: &TipManagerConfig,
        oracle: Arc<dyn MarkerOracle>,
        eviction: Arc<EvictionState>,
        observer: Box<dyn TipManagerObserver + Send + Sync>,
    ) -> Self {
        Self {
            state: RwLock::new(TipState {
                lifecycle: Lifecycle::Uninitialized,
                pool: TipPool::new(),
                future_tips: FutureTipBuffer::new(),
                latest_commitment: None,
            }),
            tsc: TscValidator::new(config, oracle, eviction.clone()),
            eviction,
            observer,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, TipState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, TipState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Write lock, only if the manager is accepting mutations.
    fn active_state(&self) -> Result<RwLockWriteGuard<'_, TipState>, TipManagerError> {
        let state = self.write_state();
        match state.lifecycle {
            Lifecycle::Active => Ok(state),
            other => Err(TipManagerError::NotActive { state: other }),
        }
    }

    fn ensure_active(&self) -> Result<(), TipManagerError> {
        match self.read_state().lifecycle {
            Lifecycle::Active => Ok(()),
            other => Err(TipManagerError::NotActive { state: other }),
        }
    }

    fn notify(&self, events: Vec<TipEvent>) {
        for event in events {
            match event {
                TipEvent::TipAdded(block) => self.observer.tip_added(block),
                TipEvent::TipRemoved(block) => self.observer.tip_removed(block),
                TipEvent::FutureTipAdded(block, commitment) => {
                    self.observer.future_tip_added(block, commitment)
                }
                TipEvent::FutureTipsPromoted(index, blocks) => {
                    self.observer.future_tips_promoted(index, &blocks)
                }
                TipEvent::FutureTipsDropped(blocks) => self.observer.future_tips_dropped(&blocks),
            }
        }
    }

    // -- Lifecycle --

    /// Uninitialized -> Active. Returns false from any other state.
    pub fn start(&self) -> bool {
        let mut state = self.write_state();
        if state.lifecycle != Lifecycle::Uninitialized {
            warn!("Tip manager cannot start while {}", state.lifecycle);
            return false;
        }
        state.lifecycle = Lifecycle::Active;
        info!("Tip manager active");
        true
    }

    /// Freeze the pool. Queries keep working.
    pub fn shutdown(&self) {
        let mut state = self.write_state();
        if state.lifecycle != Lifecycle::ShuttingDown {
            state.lifecycle = Lifecycle::ShuttingDown;
            info!(
                "Tip manager shutting down with {} tips, {} future tips",
                state.pool.len(),
                state.future_tips.len()
            );
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.read_state().lifecycle
    }

    // -- Ingestion --

    /// Handle a newly attached block: its parents stop being tips, then the
    /// block becomes a tip or a future tip.
    pub fn process_block_attached(
        &self,
        attached: &BlockAttachedMessage,
    ) -> Result<Admission, TipManagerError> {
        self.ensure_active()?;

        let block = attached.block;
        if let Some(last_evicted) = self.eviction.last_evicted_epoch() {
            if block.index <= last_evicted && !self.eviction.is_root_block(&block) {
                return Err(TipManagerError::BlockEvicted {
                    block,
                    last_evicted,
                });
            }
        }

        // Oracle lookups happen before the lock
        let tsc_valid = self.tsc.is_past_cone_timestamp_correct(&block);

        let mut events = Vec::new();
        let (admission, exclusive) = {
            let mut state = self.active_state()?;
            state.consume_parents(&attached.strong_parents, &mut events);

            let admission = if state.pool.contains(&block) || state.future_tips.contains(&block) {
                Admission::Ignored
            } else if attached.commitment.index > state.latest_committable_epoch() {
                state.future_tips.add(block, attached.commitment, attached.strong_parents.clone());
                debug!("Block {block} buffered under commitment {}", attached.commitment);
                events.push(TipEvent::FutureTipAdded(block, attached.commitment));
                Admission::FutureTip
            } else if !tsc_valid {
                debug!("Block {block} fails TSC, not added");
                Admission::TscInvalid
            } else if state.pool.add_tip(block) {
                debug!("Tip {block} added");
                events.push(TipEvent::TipAdded(block));
                Admission::Tip
            } else {
                debug!("Block {block} already has children, not added");
                Admission::Ignored
            };

            let exclusive = state.check_exclusive(&block);
            (admission, exclusive)
        };

        // Parent removals already happened, so they are reported either way
        self.notify(events);
        exclusive.map(|()| admission)
    }

    /// A block was accepted; accepted time follows its issuing time forward.
    pub fn process_block_accepted(
        &self,
        accepted: &BlockAcceptedMessage,
    ) -> Result<bool, TipManagerError> {
        self.ensure_active()?;
        let advanced = self.tsc.advance_accepted_time(accepted.issuing_time);
        if advanced {
            debug!("Accepted time advanced to {} by {}", accepted.issuing_time, accepted.block);
        }
        Ok(advanced)
    }

    /// Set the TSC reference time. The pool is not touched; stale tips are
    /// filtered by later `tips` calls.
    pub fn process_accepted_time_updated(&self, time: Timestamp) -> Result<(), TipManagerError> {
        self.ensure_active()?;
        self.tsc.set_accepted_time(time);
        debug!("Accepted time set to {time}");
        Ok(())
    }

    /// An epoch became committable: promote its future tips and drop older
    /// buckets. Returns false if the epoch was not beyond the latest one.
    pub fn process_epoch_committed(
        &self,
        commitment: CommitmentRef,
    ) -> Result<bool, TipManagerError> {
        let mut events = Vec::new();
        let promoted: Vec<BlockId> = {
            let mut state = self.active_state()?;
            if state.latest_commitment.is_some_and(|latest| commitment.index <= latest.index) {
                debug!("Ignoring commitment {commitment}, not beyond latest committable epoch");
                return Ok(false);
            }
            state.latest_commitment = Some(commitment);

            let promotion = state.future_tips.promote_epoch(commitment.index);
            if !promotion.dropped.is_empty() {
                debug!("Dropped {} stale future tips", promotion.dropped.len());
                events.push(TipEvent::FutureTipsDropped(promotion.dropped));
            }

            // Every parent goes first so order within the bucket cannot matter
            for (_, parents) in &promotion.promoted {
                state.consume_parents(parents, &mut events);
            }

            let promoted: Vec<BlockId> =
                promotion.promoted.into_iter().map(|(block, _)| block).collect();
            if !promoted.is_empty() {
                events.push(TipEvent::FutureTipsPromoted(commitment.index, promoted.clone()));
            }
            promoted
        };
        info!("Epoch {} committable, promoting {} future tips", commitment.index, promoted.len());

        let valid: Vec<BlockId> = promoted
            .into_iter()
            .filter(|block| {
                let valid = self.tsc.is_past_cone_timestamp_correct(block);
                if !valid {
                    debug!("Promoted block {block} fails TSC, not added");
                }
                valid
            })
            .collect();

        self.add_promoted(valid, &mut events);
        self.notify(events);
        Ok(true)
    }

    /// Second half of a promotion. Runs to completion even if a shutdown
    /// arrived meanwhile, but skips blocks evicted since the buffer was
    /// drained.
    fn add_promoted(&self, blocks: Vec<BlockId>, events: &mut Vec<TipEvent>) {
        let mut state = self.write_state();
        for block in blocks {
            // Checked under the lock: evict_epoch moves the boundary before
            // it takes the lock to prune the pool
            if self.eviction.is_evicted(&block) && !self.eviction.is_root_block(&block) {
                debug!("Promoted block {block} was evicted meanwhile, not added");
                continue;
            }
            if state.pool.add_tip(block) {
                debug!("Tip {block} added from future tips");
                events.push(TipEvent::TipAdded(block));
            }
        }
    }

    /// Prune epochs up to and including `index`. Root blocks stay.
    pub fn evict_epoch(&self, index: EpochIndex) -> Result<(), TipManagerError> {
        self.ensure_active()?;
        self.eviction.evict_until(index);
        let roots: HashSet<BlockId> = self.eviction.root_blocks().into_iter().collect();

        let mut events = Vec::new();
        {
            let mut state = self.active_state()?;
            let evicted_tips = state.pool.evict_until(index, |block| roots.contains(block));
            let evicted_future = state.future_tips.evict_until(index, |block| roots.contains(block));
            debug!(
                "Evicted {} tips and {} future tips until epoch {index}",
                evicted_tips.len(),
                evicted_future.len()
            );

            events.extend(evicted_tips.into_iter().map(TipEvent::TipRemoved));
            if !evicted_future.is_empty() {
                events.push(TipEvent::FutureTipsDropped(evicted_future));
            }
        }

        self.notify(events);
        Ok(())
    }

    // -- Queries --

    /// Up to `count` distinct, currently TSC-valid tips in no particular
    /// order. `count` of zero is treated as one. Falls back to root blocks
    /// when no tip qualifies.
    pub fn tips(&self, count: usize) -> Vec<BlockId> {
        let count = count.max(1);
        let (snapshot, active) = {
            let state = self.read_state();
            (state.pool.snapshot(), state.lifecycle == Lifecycle::Active)
        };

        let mut candidates: Vec<BlockId> = snapshot.into_iter().collect();
        candidates.shuffle(&mut rand::rng());

        let mut selected = Vec::with_capacity(count.min(candidates.len()));
        let mut stale = Vec::new();
        for candidate in candidates {
            if selected.len() == count {
                break;
            }
            if self.tsc.is_past_cone_timestamp_correct(&candidate) {
                selected.push(candidate);
            } else {
                stale.push(candidate);
            }
        }

        if active && !stale.is_empty() {
            let mut events = Vec::new();
            {
                let mut state = self.write_state();
                if state.lifecycle == Lifecycle::Active {
                    for block in stale {
                        if state.pool.discard(&block) {
                            debug!("Tip {block} no longer passes TSC, removed");
                            events.push(TipEvent::TipRemoved(block));
                        }
                    }
                }
            }
            self.notify(events);
        }

        if selected.is_empty() {
            return self.eviction.root_blocks().into_iter().take(count).collect();
        }
        selected
    }

    pub fn tip_count(&self) -> usize {
        self.read_state().pool.len()
    }

    /// False for unknown, evicted, buffered or referenced blocks.
    pub fn is_tip(&self, block: &BlockId) -> bool {
        self.read_state().pool.contains(block)
    }

    pub fn future_tips(&self) -> FutureTipsSnapshot {
        self.read_state().future_tips.snapshot()
    }

    pub fn tips_added_total(&self) -> u64 {
        self.read_state().pool.added_total()
    }

    pub fn tips_removed_total(&self) -> u64 {
        self.read_state().pool.removed_total()
    }

    pub fn latest_commitment(&self) -> Option<CommitmentRef> {
        self.read_state().latest_commitment
    }

    pub fn accepted_time(&self) -> Option<Timestamp> {
        self.tsc.accepted_time()
    }

    pub fn is_past_cone_timestamp_correct(&self, block: &BlockId) -> bool {
        self.tsc.is_past_cone_timestamp_correct(block)
    }
}
