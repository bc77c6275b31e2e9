//! Past-hour strike history
//!
//! The hour is split into `N = 60 / interval` buckets keyed by the minute of
//! the local hour, so a bucket is reused every 60 minutes and nothing older
//! than one hour is kept. A bucket with no data (never sampled, or skipped
//! because no sample arrived during its interval) is `None`; this is distinct
//! from a sampled interval with zero strikes.

use core::fmt::Display;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::config::{LightningConfig, MAX_BUCKETS};
use crate::time::{Timestamp, minute_of_hour};

/// Strike count for one interval, `None` if the interval has no valid data
pub type Bucket = Option<u32>;

/// Fixed-size circular history of per-interval strike counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRing {
    layout: LightningConfig,
    buckets: Vec<Bucket, MAX_BUCKETS>,
}

impl HistoryRing {
    /// Create a ring for `layout` with every bucket set to `fill`
    pub fn new(layout: LightningConfig, fill: Bucket) -> Self {
        let count = layout.interval.bucket_count();
        debug_assert!(count <= MAX_BUCKETS);
        let buckets = core::iter::repeat_n(fill, count).collect();
        Self { layout, buckets }
    }

    pub fn layout(&self) -> LightningConfig {
        self.layout
    }

    /// Whether this ring was built for `layout` and is intact
    pub fn matches(&self, layout: &LightningConfig) -> bool {
        self.layout == *layout && self.buckets.len() == layout.interval.bucket_count()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Bucket holding `timestamp`, in `[0, N)`
    pub fn bucket_index(&self, timestamp: Timestamp) -> usize {
        let minute = minute_of_hour(timestamp, self.layout.utc_offset_secs);
        usize::from(minute / self.layout.interval.minutes())
    }

    pub fn get(&self, timestamp: Timestamp) -> Bucket {
        self.buckets
            .get(self.bucket_index(timestamp))
            .copied()
            .flatten()
    }

    /// Overwrite every bucket with `value`
    pub fn reset_all(&mut self, value: Bucket) {
        self.buckets.iter_mut().for_each(|bucket| *bucket = value);
    }

    /// Record `count` strikes for the interval holding `timestamp`,
    /// replacing whatever that bucket held an hour ago
    pub fn set(&mut self, timestamp: Timestamp, count: u32) {
        let idx = self.bucket_index(timestamp);
        if let Some(bucket) = self.buckets.get_mut(idx) {
            *bucket = Some(count);
        }
    }

    /// Mark the intervals skipped between two samples as having no data.
    ///
    /// Walks `from + interval, from + 2 * interval, ...` while strictly before
    /// `to` and invalidates each bucket it lands on, except the bucket holding
    /// `to` itself. Indices repeat every `N` steps, so at most `N` steps are
    /// taken no matter how long the gap is.
    ///
    /// Returns the number of buckets invalidated.
    pub fn invalidate_range(&mut self, from: Timestamp, to: Timestamp) -> usize {
        let current = self.bucket_index(to);
        self.invalidate_steps(from, |ts| ts < to, Some(current))
    }

    /// Like [`invalidate_range`](Self::invalidate_range) but up to and
    /// including `until`, with no bucket spared. Used for queries at a time
    /// when no sample has been taken yet.
    pub fn invalidate_through(&mut self, from: Timestamp, until: Timestamp) -> usize {
        self.invalidate_steps(from, |ts| ts <= until, None)
    }

    fn invalidate_steps(
        &mut self,
        from: Timestamp,
        within: impl Fn(Timestamp) -> bool,
        keep: Option<usize>,
    ) -> usize {
        let step = self.layout.interval.secs();
        let mut invalidated = 0;
        let mut ts = from.saturating_add(step);

        for _ in 0..self.buckets.len() {
            if !within(ts) {
                break;
            }
            let idx = self.bucket_index(ts);
            if Some(idx) != keep {
                if let Some(bucket) = self.buckets.get_mut(idx) {
                    *bucket = None;
                    invalidated += 1;
                }
            }
            ts = ts.saturating_add(step);
        }

        invalidated
    }

    /// Sum of all buckets with data, `None` if no bucket has data
    pub fn sum_valid(&self) -> Option<u32> {
        self.buckets
            .iter()
            .flatten()
            .fold(None, |sum, &count| {
                Some(sum.unwrap_or(0u32).saturating_add(count))
            })
    }
}

impl Display for HistoryRing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "hist[]={{")?;
        for (i, bucket) in self.buckets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match bucket {
                Some(count) => write!(f, "{count}")?,
                None => write!(f, "-")?,
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60;

    fn five_minute_ring(fill: Bucket) -> HistoryRing {
        HistoryRing::new(LightningConfig::with_interval_minutes(5).unwrap(), fill)
    }

    #[test]
    fn test_new_ring_length() {
        let ring = five_minute_ring(Some(0));
        assert_eq!(ring.len(), 12);
        assert!(ring.buckets().iter().all(|b| *b == Some(0)));

        let ring = HistoryRing::new(LightningConfig::with_interval_minutes(1).unwrap(), None);
        assert_eq!(ring.len(), MAX_BUCKETS);
    }

    #[test]
    fn test_bucket_index() {
        let ring = five_minute_ring(Some(0));
        assert_eq!(ring.bucket_index(0), 0);
        assert_eq!(ring.bucket_index(4 * MIN + 59), 0);
        assert_eq!(ring.bucket_index(5 * MIN), 1);
        assert_eq!(ring.bucket_index(59 * MIN), 11);
        assert_eq!(ring.bucket_index(60 * MIN), 0);
        assert_eq!(ring.bucket_index(2 * 3600 + 35 * MIN), 7);
    }

    #[test]
    fn test_set_overwrites_bucket_from_previous_hour() {
        let mut ring = five_minute_ring(Some(0));
        ring.set(10 * MIN, 4);
        assert_eq!(ring.get(10 * MIN), Some(4));

        ring.set(3600 + 12 * MIN, 1);
        assert_eq!(ring.get(10 * MIN), Some(1));
        assert_eq!(ring.sum_valid(), Some(1));
    }

    #[test]
    fn test_reset_all() {
        let mut ring = five_minute_ring(Some(0));
        ring.set(0, 3);
        ring.reset_all(None);
        assert!(ring.buckets().iter().all(Option::is_none));
        ring.reset_all(Some(2));
        assert_eq!(ring.sum_valid(), Some(24));
    }

    #[test]
    fn test_invalidate_range_marks_skipped_intervals() {
        let mut ring = five_minute_ring(Some(0));
        // Samples at minute 5 and minute 35: minutes 10..=30 were never sampled
        let invalidated = ring.invalidate_range(5 * MIN, 35 * MIN);
        assert_eq!(invalidated, 5);
        for minute in [10, 15, 20, 25, 30] {
            assert_eq!(ring.get(minute * MIN), None, "minute {minute}");
        }
        for minute in [0, 5, 35, 40, 55] {
            assert_eq!(ring.get(minute * MIN), Some(0), "minute {minute}");
        }
    }

    #[test]
    fn test_invalidate_range_adjacent_samples() {
        let mut ring = five_minute_ring(Some(0));
        assert_eq!(ring.invalidate_range(5 * MIN, 10 * MIN), 0);
        assert_eq!(ring.invalidate_range(4 * MIN + 59, 5 * MIN + 1), 0);
        assert_eq!(ring.sum_valid(), Some(0));
    }

    #[test]
    fn test_invalidate_range_spares_current_bucket() {
        let mut ring = five_minute_ring(Some(0));
        ring.set(9 * MIN + 50, 7);
        // First step lands at minute 5, the same bucket as the end timestamp
        assert_eq!(ring.invalidate_range(0, 9 * MIN + 50), 0);
        assert_eq!(ring.get(9 * MIN + 50), Some(7));
    }

    #[test]
    fn test_invalidate_range_unaligned_gap() {
        let mut ring = five_minute_ring(Some(0));
        // 4:50 -> 10:10 skips the whole 5..10 interval
        assert_eq!(ring.invalidate_range(4 * MIN + 50, 10 * MIN + 10), 1);
        assert_eq!(ring.get(5 * MIN), None);
        assert_eq!(ring.get(10 * MIN), Some(0));
    }

    #[test]
    fn test_invalidate_range_long_gap_is_bounded() {
        let mut ring = five_minute_ring(Some(0));
        let to = 30 * 24 * 3600 + 20 * MIN;
        let invalidated = ring.invalidate_range(0, to);
        assert_eq!(invalidated, 11);
        assert_eq!(ring.get(to), Some(0));
        assert_eq!(ring.sum_valid(), Some(0));
        assert_eq!(ring.buckets().iter().filter(|b| b.is_none()).count(), 11);
    }

    #[test]
    fn test_invalidate_through_includes_end() {
        let mut ring = five_minute_ring(Some(1));
        assert_eq!(ring.invalidate_through(0, 10 * MIN), 2);
        assert_eq!(ring.get(5 * MIN), None);
        assert_eq!(ring.get(10 * MIN), None);
        assert_eq!(ring.sum_valid(), Some(10));

        assert_eq!(ring.invalidate_through(0, 5 * 3600), 12);
        assert_eq!(ring.sum_valid(), None);
    }

    #[test]
    fn test_sum_valid_distinguishes_empty_from_zero() {
        let mut ring = five_minute_ring(None);
        assert_eq!(ring.sum_valid(), None);

        ring.set(0, 0);
        assert_eq!(ring.sum_valid(), Some(0));

        ring.set(5 * MIN, 3);
        ring.set(35 * MIN, 2);
        assert_eq!(ring.sum_valid(), Some(5));
    }

    #[test]
    fn test_layout_matches() {
        let layout = LightningConfig::with_interval_minutes(5).unwrap();
        let ring = HistoryRing::new(layout, Some(0));
        assert!(ring.matches(&layout));
        assert!(!ring.matches(&LightningConfig::with_interval_minutes(10).unwrap()));
        assert!(!ring.matches(&LightningConfig { utc_offset_secs: 1800, ..layout }));
    }
}
