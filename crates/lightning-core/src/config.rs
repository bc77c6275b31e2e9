//! Tracker configuration
//!
//! The update interval decides how the past hour is split into history
//! buckets; the UTC offset decides which wall-clock minute a timestamp falls
//! on. Defaults are resolved at build time from `LIGHTNING_UPDATE_RATE_MIN`
//! and `LIGHTNING_UTC_OFFSET_SECS` (see `build.rs`).

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::time::SECS_PER_MINUTE;

/// Minutes per hour, the span covered by the history ring
pub const MINUTES_PER_HOUR: u8 = 60;

/// Upper bound on the number of history buckets (one-minute interval)
pub const MAX_BUCKETS: usize = MINUTES_PER_HOUR as usize;

include!(concat!(env!("OUT_DIR"), "/defaults.rs"));

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Update interval of {minutes} min does not evenly divide an hour")]
    InvalidUpdateInterval { minutes: u8 },
}

/// Sampling granularity in whole minutes
///
/// Always a divisor of 60, so the hour splits into `bucket_count()` equally
/// sized buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct UpdateInterval(u8);

impl UpdateInterval {
    pub const fn new(minutes: u8) -> Result<Self, ConfigError> {
        if minutes == 0 || minutes > MINUTES_PER_HOUR || MINUTES_PER_HOUR % minutes != 0 {
            return Err(ConfigError::InvalidUpdateInterval { minutes });
        }
        Ok(Self(minutes))
    }

    pub const fn minutes(self) -> u8 {
        self.0
    }

    pub const fn secs(self) -> i64 {
        self.0 as i64 * SECS_PER_MINUTE
    }

    /// Number of history buckets, `60 / minutes`
    pub const fn bucket_count(self) -> usize {
        (MINUTES_PER_HOUR / self.0) as usize
    }

    /// Span of the whole history ring in seconds
    pub const fn window_secs(self) -> i64 {
        self.bucket_count() as i64 * self.secs()
    }
}

impl Default for UpdateInterval {
    fn default() -> Self {
        // build.rs has already rejected invalid values
        Self(DEFAULT_UPDATE_RATE_MIN)
    }
}

impl TryFrom<u8> for UpdateInterval {
    type Error = ConfigError;

    fn try_from(minutes: u8) -> Result<Self, Self::Error> {
        Self::new(minutes)
    }
}

impl From<UpdateInterval> for u8 {
    fn from(interval: UpdateInterval) -> Self {
        interval.0
    }
}

/// Layout of the tracker's history ring
///
/// Persisted alongside the history so that a record written under a
/// different layout is recognized on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningConfig {
    pub interval: UpdateInterval,
    pub utc_offset_secs: i32,
}

impl LightningConfig {
    pub const fn new(interval: UpdateInterval, utc_offset_secs: i32) -> Self {
        Self {
            interval,
            utc_offset_secs,
        }
    }

    /// Config for an interval in minutes, in UTC
    pub fn with_interval_minutes(minutes: u8) -> Result<Self, ConfigError> {
        Ok(Self::new(UpdateInterval::new(minutes)?, 0))
    }
}

impl Default for LightningConfig {
    fn default() -> Self {
        Self::new(UpdateInterval::default(), DEFAULT_UTC_OFFSET_SECS)
    }
}
