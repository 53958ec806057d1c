//! Shared test infrastructure for tip manager integration tests.
//!
//! Blocks are created by alias. A small booker assigns markers: a block
//! declared with `.marker(s, i)` carries that marker and records the markers
//! inherited from its parents as its past markers; every other block inherits
//! the newest marker per sequence from its parents.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{TimeDelta, TimeZone, Utc};
use tangle_common::messages::{BlockAcceptedMessage, BlockAttachedMessage};
use tangle_common::{
    BlockId, CommitmentId, CommitmentRef, EpochIndex, Hash, Marker, Timestamp, EMPTY_BLOCK_ID,
};
use tangle_module_tip_manager::configuration::TipManagerConfig;
use tangle_module_tip_manager::eviction::EvictionState;
use tangle_module_tip_manager::manager::{Admission, TipManager};
use tangle_module_tip_manager::marker_oracle::MarkerCache;
use tangle_module_tip_manager::tip_error::TipManagerError;
use tangle_module_tip_manager::tip_observer::TipManagerObserver;

pub const GENESIS: &str = "Genesis";

/// Fixed reference time all test timestamps are relative to.
pub fn base_time() -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Commitment id derived from a short name.
pub fn commitment_id(name: &str) -> CommitmentId {
    let mut bytes = [0u8; 32];
    for (slot, byte) in bytes.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    Hash::new(bytes)
}

pub fn commitment(index: EpochIndex, name: &str) -> CommitmentRef {
    CommitmentRef::new(index, commitment_id(name))
}

/// Everything the observer saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    TipAdded(BlockId),
    TipRemoved(BlockId),
    FutureTipAdded(BlockId, CommitmentRef),
    FutureTipsPromoted(EpochIndex, Vec<BlockId>),
    FutureTipsDropped(Vec<BlockId>),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: RecordedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl TipManagerObserver for RecordingObserver {
    fn tip_added(&self, block: BlockId) {
        self.record(RecordedEvent::TipAdded(block));
    }

    fn tip_removed(&self, block: BlockId) {
        self.record(RecordedEvent::TipRemoved(block));
    }

    fn future_tip_added(&self, block: BlockId, commitment: CommitmentRef) {
        self.record(RecordedEvent::FutureTipAdded(block, commitment));
    }

    fn future_tips_promoted(&self, index: EpochIndex, blocks: &[BlockId]) {
        self.record(RecordedEvent::FutureTipsPromoted(index, blocks.to_vec()));
    }

    fn future_tips_dropped(&self, blocks: &[BlockId]) {
        self.record(RecordedEvent::FutureTipsDropped(blocks.to_vec()));
    }
}

#[derive(Debug, Clone)]
pub struct TestBlock {
    pub id: BlockId,
    pub parents: Vec<BlockId>,
    pub issuing_time: Timestamp,
    pub commitment: CommitmentRef,
    pub markers: Vec<Marker>,
}

pub struct TestFramework {
    pub manager: Arc<TipManager>,
    pub cache: Arc<MarkerCache>,
    pub eviction: Arc<EvictionState>,
    pub observer: Arc<RecordingObserver>,
    blocks: HashMap<String, TestBlock>,
    next_hash: u64,
}

impl TestFramework {
    /// Active tip manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TipManagerConfig::default())
    }

    pub fn with_config(config: TipManagerConfig) -> Self {
        let tf = Self::unstarted(config);
        tf.manager.start();
        tf
    }

    pub fn unstarted(config: TipManagerConfig) -> Self {
        let cache = Arc::new(MarkerCache::new());
        let eviction = Arc::new(EvictionState::new());
        let observer = Arc::new(RecordingObserver::default());
        let manager = Arc::new(TipManager::new(
            &config,
            cache.clone(),
            eviction.clone(),
            Box::new(observer.clone()),
        ));

        let genesis = TestBlock {
            id: EMPTY_BLOCK_ID,
            parents: vec![],
            issuing_time: base_time(),
            commitment: CommitmentRef::default(),
            markers: vec![Marker::GENESIS],
        };
        cache.book_block(EMPTY_BLOCK_ID, base_time(), vec![Marker::GENESIS]);
        cache.set_block_accepted(&EMPTY_BLOCK_ID);

        Self {
            manager,
            cache,
            eviction,
            observer,
            blocks: HashMap::from([(GENESIS.to_string(), genesis)]),
            next_hash: 1,
        }
    }

    /// Start describing a block. Defaults: parent Genesis, epoch 1, issued
    /// at the base time, genesis commitment.
    pub fn create_block(&mut self, alias: &str) -> BlockBuilder<'_> {
        BlockBuilder {
            tf: self,
            alias: alias.to_string(),
            parents: vec![GENESIS.to_string()],
            epoch: 1,
            issuing_time: base_time(),
            commitment: CommitmentRef::default(),
            marker: None,
            accepted: false,
        }
    }

    pub fn block(&self, alias: &str) -> &TestBlock {
        self.blocks.get(alias).unwrap_or_else(|| panic!("unknown block alias {alias}"))
    }

    pub fn block_id(&self, alias: &str) -> BlockId {
        self.block(alias).id
    }

    pub fn block_ids(&self, aliases: &[&str]) -> BTreeSet<BlockId> {
        aliases.iter().map(|alias| self.block_id(alias)).collect()
    }

    pub fn tips(&self, count: usize) -> BTreeSet<BlockId> {
        let tips = self.manager.tips(count);
        let unique: BTreeSet<BlockId> = tips.iter().copied().collect();
        assert_eq!(unique.len(), tips.len(), "tips returned a duplicate id");
        unique
    }

    pub fn assert_tips(&self, count: usize, aliases: &[&str]) {
        assert_eq!(self.tips(count), self.block_ids(aliases));
    }

    pub fn assert_tip_count(&self, expected: usize) {
        assert_eq!(self.manager.tip_count(), expected, "tip count");
    }

    pub fn assert_tips_added(&self, expected: u64) {
        assert_eq!(self.manager.tips_added_total(), expected, "tips added");
    }

    pub fn assert_tips_removed(&self, expected: u64) {
        assert_eq!(self.manager.tips_removed_total(), expected, "tips removed");
    }

    pub fn assert_future_tips(&self, expected: &[(EpochIndex, &str, &[&str])]) {
        let mut wanted: BTreeMap<EpochIndex, BTreeMap<CommitmentId, BTreeSet<BlockId>>> =
            BTreeMap::new();
        for (index, name, aliases) in expected {
            wanted.entry(*index).or_default().insert(commitment_id(name), self.block_ids(aliases));
        }
        assert_eq!(self.manager.future_tips(), wanted);
    }

    pub fn assert_tsc(&self, alias: &str, expected: bool) {
        assert_eq!(
            self.manager.is_past_cone_timestamp_correct(&self.block_id(alias)),
            expected,
            "TSC of {alias}"
        );
    }

    pub fn set_accepted_time(&self, time: Timestamp) {
        self.manager.process_accepted_time_updated(time).unwrap();
    }

    pub fn set_blocks_accepted(&self, aliases: &[&str]) {
        for alias in aliases {
            let block = self.block(alias);
            self.cache.set_block_accepted(&block.id);
            self.manager
                .process_block_accepted(&BlockAcceptedMessage {
                    block: block.id,
                    issuing_time: block.issuing_time,
                })
                .unwrap();
        }
    }

    pub fn set_markers_accepted(&self, markers: &[Marker]) {
        for marker in markers {
            self.cache.set_marker_accepted(*marker);
        }
    }

    /// Attach an already booked block.
    pub fn attach(&self, alias: &str) -> Result<Admission, TipManagerError> {
        let block = self.block(alias);
        self.manager.process_block_attached(&BlockAttachedMessage {
            block: block.id,
            strong_parents: block.parents.clone(),
            commitment: block.commitment,
            issuing_time: block.issuing_time,
        })
    }

    pub fn issue_blocks(&self, aliases: &[&str]) {
        for alias in aliases {
            self.attach(alias).unwrap();
        }
    }

    pub fn commit(&self, index: EpochIndex, name: &str) -> bool {
        self.manager.process_epoch_committed(commitment(index, name)).unwrap()
    }

    fn next_id(&mut self, epoch: EpochIndex) -> BlockId {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&self.next_hash.to_be_bytes());
        self.next_hash += 1;
        BlockId::new(Hash::new(bytes), epoch)
    }

    /// Newest marker per sequence over the parents' markers.
    fn inherited_markers(&self, parents: &[BlockId]) -> Vec<Marker> {
        let mut newest: BTreeMap<u64, u64> = BTreeMap::new();
        for parent in parents {
            let Some(block) = self.blocks.values().find(|block| block.id == *parent) else {
                continue;
            };
            for marker in &block.markers {
                let index = newest.entry(marker.sequence).or_insert(marker.index);
                *index = (*index).max(marker.index);
            }
        }
        newest.into_iter().map(|(sequence, index)| Marker::new(sequence, index)).collect()
    }
}

pub struct BlockBuilder<'a> {
    tf: &'a mut TestFramework,
    alias: String,
    parents: Vec<String>,
    epoch: EpochIndex,
    issuing_time: Timestamp,
    commitment: CommitmentRef,
    marker: Option<Marker>,
    accepted: bool,
}

impl<'a> BlockBuilder<'a> {
    pub fn parents(mut self, aliases: &[&str]) -> Self {
        self.parents = aliases.iter().map(|alias| alias.to_string()).collect();
        self
    }

    pub fn epoch(mut self, epoch: EpochIndex) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn issued_at(mut self, time: Timestamp) -> Self {
        self.issuing_time = time;
        self
    }

    /// Issued `offset` relative to the base time.
    pub fn issued(self, offset: TimeDelta) -> Self {
        self.issued_at(base_time() + offset)
    }

    pub fn commitment(mut self, index: EpochIndex, name: &str) -> Self {
        self.commitment = commitment(index, name);
        self
    }

    /// The block starts marker `(sequence, index)`.
    pub fn marker(mut self, sequence: u64, index: u64) -> Self {
        self.marker = Some(Marker::new(sequence, index));
        self
    }

    pub fn accepted(mut self) -> Self {
        self.accepted = true;
        self
    }

    /// Book the block without attaching it.
    pub fn book(self) -> BlockId {
        let (tf, alias, accepted) = self.record();
        if accepted {
            tf.set_blocks_accepted(&[alias.as_str()]);
        }
        tf.block_id(&alias)
    }

    /// Book and attach the block, then accept it if requested.
    pub fn issue(self) -> Result<Admission, TipManagerError> {
        let (tf, alias, accepted) = self.record();
        let admission = tf.attach(&alias);
        if accepted && admission.is_ok() {
            tf.set_blocks_accepted(&[alias.as_str()]);
        }
        admission
    }

    fn record(self) -> (&'a mut TestFramework, String, bool) {
        let tf = self.tf;
        let parents: Vec<BlockId> = self.parents.iter().map(|alias| tf.block_id(alias)).collect();
        let id = tf.next_id(self.epoch);
        let inherited = tf.inherited_markers(&parents);

        let markers = match self.marker {
            Some(marker) => {
                let past: Vec<Marker> =
                    inherited.into_iter().filter(|past| !past.is_genesis()).collect();
                tf.cache.book_marker(marker, id, self.issuing_time, past);
                vec![marker]
            }
            None => inherited,
        };
        tf.cache.book_block(id, self.issuing_time, markers.clone());

        tf.blocks.insert(
            self.alias.clone(),
            TestBlock {
                id,
                parents,
                issuing_time: self.issuing_time,
                commitment: self.commitment,
                markers,
            },
        );
        (tf, self.alias, self.accepted)
    }
}
