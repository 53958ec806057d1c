//! Helpers for issuing a new block on top of selected tips.

use tangle_common::{BlockId, Timestamp};
use tracing::trace;

use crate::marker_oracle::MarkerOracle;

/// Pick the attachment to reference when liking a conflict.
///
/// The oldest attachment wins; equal issuing times fall back to the smaller
/// block id, so the result does not depend on input order.
pub fn select_like_reference(attachments: &[(BlockId, Timestamp)]) -> Option<BlockId> {
    attachments
        .iter()
        .min_by(|(a_id, a_time), (b_id, b_time)| a_time.cmp(b_time).then_with(|| a_id.cmp(b_id)))
        .map(|(block, _)| *block)
}

/// Issuing time for a block with `parents`: `now`, unless a parent claims a
/// later time. The genesis sentinel and parents the oracle does not know are
/// skipped.
pub fn issuing_time_for(parents: &[BlockId], now: Timestamp, oracle: &dyn MarkerOracle) -> Timestamp {
    parents
        .iter()
        .filter(|parent| !parent.is_empty())
        .filter_map(|parent| match oracle.block_metadata(parent) {
            Ok(metadata) => Some(metadata.issuing_time),
            Err(e) => {
                trace!("Ignoring parent {parent} for issuing time: {e}");
                None
            }
        })
        .fold(now, |latest, time| latest.max(time))
}
