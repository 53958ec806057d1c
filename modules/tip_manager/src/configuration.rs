//! Tip manager configuration.

use chrono::TimeDelta;
use config::Config;

use crate::tip_error::TipManagerError;

pub const CONFIG_KEY_TSC_THRESHOLD: &str = "time-since-confirmation-threshold";
pub const CONFIG_KEY_MAX_PAST_MARKER_DISTANCE: &str = "max-past-marker-distance";

/// Seconds
pub const DEFAULT_TSC_THRESHOLD: i64 = 300;
pub const DEFAULT_MAX_PAST_MARKER_DISTANCE: i64 = 30;

/// Validated tip manager settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipManagerConfig {
    /// Unaccepted history older than accepted time minus this is stale.
    pub time_since_confirmation_threshold: TimeDelta,

    /// Maximum number of past-marker hops the TSC walk takes.
    pub max_past_marker_distance: usize,
}

impl TipManagerConfig {
    /// Build a config, rejecting a negative threshold or a zero walk bound.
    pub fn new(
        time_since_confirmation_threshold: TimeDelta,
        max_past_marker_distance: usize,
    ) -> Result<Self, TipManagerError> {
        if time_since_confirmation_threshold < TimeDelta::zero() {
            return Err(TipManagerError::InvalidThreshold {
                threshold: time_since_confirmation_threshold.to_string(),
            });
        }
        if max_past_marker_distance == 0 {
            return Err(TipManagerError::InvalidMaxPastMarkerDistance { distance: 0 });
        }

        Ok(Self {
            time_since_confirmation_threshold,
            max_past_marker_distance,
        })
    }

    /// Read the module's config section, falling back to defaults for
    /// missing keys.
    pub fn from_config(config: &Config) -> Result<Self, TipManagerError> {
        let threshold_secs =
            config.get_int(CONFIG_KEY_TSC_THRESHOLD).unwrap_or(DEFAULT_TSC_THRESHOLD);
        let threshold = TimeDelta::try_seconds(threshold_secs).ok_or_else(|| {
            TipManagerError::InvalidThreshold {
                threshold: format!("{threshold_secs}s"),
            }
        })?;

        let distance = config
            .get_int(CONFIG_KEY_MAX_PAST_MARKER_DISTANCE)
            .unwrap_or(DEFAULT_MAX_PAST_MARKER_DISTANCE);
        let max_past_marker_distance = usize::try_from(distance)
            .map_err(|_| TipManagerError::InvalidMaxPastMarkerDistance { distance })?;

        Self::new(threshold, max_past_marker_distance)
    }
}

impl Default for TipManagerConfig {
    fn default() -> Self {
        Self {
            time_since_confirmation_threshold: TimeDelta::seconds(DEFAULT_TSC_THRESHOLD),
            max_past_marker_distance: DEFAULT_MAX_PAST_MARKER_DISTANCE as usize,
        }
    }
}
