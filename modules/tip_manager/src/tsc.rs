//! Time-since-confirmation validity of a block's past cone.
//!
//! A block may only be used as a parent if no unaccepted part of its history
//! is older than `accepted time - threshold`. The check walks markers rather
//! than blocks, breadth first, and gives up (invalid) once it would have to
//! look further back than the configured past-marker distance.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use tangle_common::{BlockId, Marker, Timestamp};
use tracing::{debug, trace};

use crate::configuration::TipManagerConfig;
use crate::eviction::EvictionState;
use crate::marker_oracle::{MarkerOracle, OracleError};

/// TSC rule evaluator.
pub struct TscValidator {
    oracle: Arc<dyn MarkerOracle>,
    eviction: Arc<EvictionState>,
    threshold: TimeDelta,
    max_past_marker_distance: usize,
    /// None until the first acceptance, which disables the rule.
    accepted_time: RwLock<Option<Timestamp>>,
}

impl TscValidator {
    pub fn new(
        config: &TipManagerConfig,
        oracle: Arc<dyn MarkerOracle>,
        eviction: Arc<EvictionState>,
    ) -> Self {
        Self {
            oracle,
            eviction,
            threshold: config.time_since_confirmation_threshold,
            max_past_marker_distance: config.max_past_marker_distance,
            accepted_time: RwLock::new(None),
        }
    }

    pub fn accepted_time(&self) -> Option<Timestamp> {
        *self.accepted_time.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the reference time, in either direction.
    pub fn set_accepted_time(&self, time: Timestamp) {
        *self.accepted_time.write().unwrap_or_else(|e| e.into_inner()) = Some(time);
    }

    /// Move the reference time forward to `time` if it is newer.
    /// Returns true if it moved.
    pub fn advance_accepted_time(&self, time: Timestamp) -> bool {
        let mut accepted_time = self.accepted_time.write().unwrap_or_else(|e| e.into_inner());
        if accepted_time.is_some_and(|current| current >= time) {
            return false;
        }
        *accepted_time = Some(time);
        true
    }

    /// Oldest issuing time an unaccepted marker may have, if the rule is live.
    pub fn min_supported_timestamp(&self) -> Option<Timestamp> {
        self.accepted_time().map(|accepted| {
            accepted.checked_sub_signed(self.threshold).unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }

    /// Whether `block` is a valid attachment point under the TSC rule.
    pub fn is_past_cone_timestamp_correct(&self, block: &BlockId) -> bool {
        if block.is_empty() || self.eviction.is_root_block(block) {
            return true;
        }

        // Bootstrapping: nothing accepted yet, nothing to compare against
        let Some(min_supported) = self.min_supported_timestamp() else {
            return true;
        };

        let metadata = match self.oracle.block_metadata(block) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Cannot validate {block}: {e}");
                return false;
            }
        };

        if metadata.accepted {
            return true;
        }
        if metadata.issuing_time < min_supported {
            trace!("Block {block} is older than {min_supported} and not accepted");
            return false;
        }

        self.markers_are_recent(block, metadata.markers, min_supported)
    }

    /// Bounded breadth-first walk over the past markers of `block`.
    fn markers_are_recent(
        &self,
        block: &BlockId,
        markers: Vec<Marker>,
        min_supported: Timestamp,
    ) -> bool {
        let mut queue: VecDeque<(Marker, usize)> =
            markers.into_iter().map(|marker| (marker, 0)).collect();
        let mut visited: HashSet<Marker> = HashSet::new();

        while let Some((marker, distance)) = queue.pop_front() {
            if marker.is_genesis() || !visited.insert(marker) {
                continue;
            }

            // Accepted markers vouch for everything before them
            if self.oracle.is_marker_accepted(&marker) {
                continue;
            }

            let metadata = match self.oracle.marker_metadata(&marker) {
                Ok(metadata) => metadata,
                Err(OracleError::MarkerEvicted(_)) => {
                    trace!("Marker {marker} pruned with its epoch, settled");
                    continue;
                }
                Err(e) => {
                    debug!("Cannot validate {block}: {e}");
                    return false;
                }
            };

            if metadata.accepted
                || self.eviction.is_root_block(&metadata.block)
                || self.eviction.is_evicted(&metadata.block)
            {
                continue;
            }

            if metadata.issuing_time < min_supported {
                trace!("Block {block} references stale unaccepted marker {marker}");
                return false;
            }

            if metadata.past_markers.is_empty() {
                continue;
            }
            if distance + 1 > self.max_past_marker_distance {
                debug!("Block {block} exceeds the past marker distance at {marker}");
                return false;
            }
            queue.extend(metadata.past_markers.into_iter().map(|past| (past, distance + 1)));
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker_oracle::MarkerCache;
    use chrono::TimeZone;
    use tangle_common::{Hash, EMPTY_BLOCK_ID};

    fn block(n: u8) -> BlockId {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        BlockId::new(Hash::new(bytes), 1)
    }

    fn at(minutes: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    fn validator(max_distance: usize) -> (TscValidator, Arc<MarkerCache>, Arc<EvictionState>) {
        let cache = Arc::new(MarkerCache::new());
        let eviction = Arc::new(EvictionState::new());
        let config = TipManagerConfig::new(TimeDelta::minutes(5), max_distance).unwrap();
        let validator = TscValidator::new(&config, cache.clone(), eviction.clone());
        (validator, cache, eviction)
    }

    /// A chain of markers on sequence 1, one per minute from `start`, each
    /// carried by its own block. Returns the blocks in order.
    fn marker_chain(cache: &MarkerCache, start: i64, length: u64) -> Vec<BlockId> {
        (1..=length)
            .map(|index| {
                let carrier = block(index as u8);
                let marker = Marker::new(1, index);
                let past = if index == 1 {
                    vec![]
                } else {
                    vec![Marker::new(1, index - 1)]
                };
                let time = at(start + index as i64);
                cache.book_marker(marker, carrier, time, past);
                cache.book_block(carrier, time, vec![marker]);
                carrier
            })
            .collect()
    }

    #[test]
    fn test_everything_valid_before_acceptance() {
        let (validator, cache, _) = validator(10);
        let chain = marker_chain(&cache, 0, 3);
        assert!(validator.is_past_cone_timestamp_correct(&chain[2]));
        assert!(validator.is_past_cone_timestamp_correct(&block(99)));
    }

    #[test]
    fn test_genesis_and_roots_always_valid() {
        let (validator, cache, eviction) = validator(10);
        let chain = marker_chain(&cache, 0, 2);
        validator.set_accepted_time(at(60));

        assert!(validator.is_past_cone_timestamp_correct(&EMPTY_BLOCK_ID));
        assert!(!validator.is_past_cone_timestamp_correct(&chain[0]));
        eviction.add_root_block(chain[0]);
        assert!(validator.is_past_cone_timestamp_correct(&chain[0]));
    }

    #[test]
    fn test_unknown_block_is_invalid() {
        let (validator, _, _) = validator(10);
        validator.set_accepted_time(at(0));
        assert!(!validator.is_past_cone_timestamp_correct(&block(42)));
    }

    #[test]
    fn test_stale_unaccepted_marker_invalidates_young_block() {
        let (validator, cache, _) = validator(10);
        let chain = marker_chain(&cache, 0, 1);
        let tip = block(50);
        cache.book_block(tip, at(9), vec![Marker::new(1, 1)]);

        validator.set_accepted_time(at(10));
        assert!(!validator.is_past_cone_timestamp_correct(&tip));

        cache.set_marker_accepted(Marker::new(1, 1));
        assert!(validator.is_past_cone_timestamp_correct(&tip));
        assert!(!validator.is_past_cone_timestamp_correct(&chain[0]));
    }

    #[test]
    fn test_accepted_block_is_valid_regardless_of_age() {
        let (validator, cache, _) = validator(10);
        let chain = marker_chain(&cache, 0, 1);
        validator.set_accepted_time(at(60));
        cache.set_block_accepted(&chain[0]);
        assert!(validator.is_past_cone_timestamp_correct(&chain[0]));
    }

    #[test]
    fn test_distance_bound_stops_walk() {
        // Markers at minutes 1..=4, all within the threshold of minute 5
        let (validator, cache, _) = validator(2);
        let chain = marker_chain(&cache, 0, 4);
        validator.set_accepted_time(at(5));

        // Marker 1/2 reaches 1/1 in one hop
        assert!(validator.is_past_cone_timestamp_correct(&chain[1]));
        // Marker 1/4 would need three hops to reach the sequence start
        assert!(!validator.is_past_cone_timestamp_correct(&chain[3]));

        cache.set_marker_accepted(Marker::new(1, 2));
        assert!(validator.is_past_cone_timestamp_correct(&chain[3]));
    }

    #[test]
    fn test_accepted_time_advances_monotonically() {
        let (validator, _, _) = validator(10);
        assert_eq!(validator.min_supported_timestamp(), None);
        assert!(validator.advance_accepted_time(at(10)));
        assert!(!validator.advance_accepted_time(at(3)));
        assert_eq!(validator.accepted_time(), Some(at(10)));
        assert_eq!(validator.min_supported_timestamp(), Some(at(5)));

        validator.set_accepted_time(at(3));
        assert_eq!(validator.accepted_time(), Some(at(3)));
    }

    #[test]
    fn test_pruned_history_is_settled() {
        let (validator, cache, eviction) = validator(10);
        let root = BlockId::new(Hash::new([1; 32]), 1);
        let recent = BlockId::new(Hash::new([2; 32]), 3);
        cache.book_marker(Marker::new(1, 1), root, at(1), vec![]);
        cache.book_block(root, at(1), vec![Marker::new(1, 1)]);
        cache.book_marker(Marker::new(1, 2), recent, at(9), vec![Marker::new(1, 1)]);
        cache.book_block(recent, at(9), vec![Marker::new(1, 2)]);
        eviction.add_root_block(root);
        validator.set_accepted_time(at(10));
        assert!(validator.is_past_cone_timestamp_correct(&recent));

        cache.evict_until(1);
        eviction.evict_until(1);

        assert!(validator.is_past_cone_timestamp_correct(&recent));
        assert!(validator.is_past_cone_timestamp_correct(&root));
    }

    #[test]
    fn test_accepted_marker_checked_before_metadata() {
        let (validator, cache, _) = validator(10);
        let tip = block(50);
        cache.book_block(tip, at(9), vec![Marker::new(7, 3)]);
        validator.set_accepted_time(at(10));

        // No metadata for 7/3 at all: cannot validate
        assert!(!validator.is_past_cone_timestamp_correct(&tip));

        cache.set_marker_accepted(Marker::new(7, 3));
        assert!(validator.is_past_cone_timestamp_correct(&tip));
    }

    #[test]
    fn test_min_supported_timestamp_saturates() {
        let (validator, _, _) = validator(10);
        validator.set_accepted_time(DateTime::<Utc>::MIN_UTC);
        assert_eq!(validator.min_supported_timestamp(), Some(DateTime::<Utc>::MIN_UTC));
    }
}
