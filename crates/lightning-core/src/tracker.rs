//! Lightning strike tracking
//!
//! The sensor only reports a running strike counter, the estimated distance
//! of the latest strike and a startup flag. [`LightningTracker`] turns a
//! stream of such samples into:
//!
//! - the number of strikes since the previous sample and when they happened
//!   ([`last_event`](LightningTracker::last_event))
//! - the number of strikes over the past 60 minutes
//!   ([`past_hour`](LightningTracker::past_hour))
//!
//! ## Reconciliation
//!
//! Each sample is compared with the previously seen counter value:
//!
//! - **No baseline yet**: the history is initialized and the counter value
//!   becomes the baseline. Nothing else happens.
//! - **Counter went down**: the sensor was reset or its counter overflowed
//!   (the two cannot be told apart). The counter value becomes the new
//!   baseline. Nothing else happens.
//! - **Counter went up**: the difference is recorded as the last event.
//! - **Counter unchanged**: no event.
//!
//! In the last two cases the strike delta (possibly zero) is written to the
//! history bucket of the sample, and the buckets of intervals that passed
//! without a sample are marked as having no data. If a whole hour or more
//! has passed since the previous update, the history is reset first.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut tracker = LightningTracker::new(LightningConfig::default(), MemoryStore::new());
//! if let Err(e) = tracker.load() {
//!     warn!("Using volatile lightning state: {}", e);
//! }
//!
//! // Once per sampling cycle
//! let result = tracker.reconcile(LightningSample::new(timestamp, counter, distance, startup));
//!
//! if let Some(event) = tracker.last_event() { /* ... */ }
//! let strikes_past_hour = tracker.past_hour();
//! ```

use log::{debug, error, info, trace, warn};

use crate::config::LightningConfig;
use crate::history::{Bucket, HistoryRing};
use crate::state::{LastEvent, LightningState};
use crate::storage::{PersistenceError, RecordStore, StateStore};
use crate::time::Timestamp;

/// One reading from the lightning sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightningSample {
    /// Time of the reading, seconds since the Unix epoch
    pub timestamp: Timestamp,
    /// Running strike counter, monotonic while the sensor stays powered
    pub counter: i32,
    /// Estimated distance of the latest strike in km
    pub distance: u8,
    /// Sensor reported a (re)start. Currently not used by reconciliation.
    pub startup: bool,
}

impl LightningSample {
    pub const fn new(timestamp: Timestamp, counter: i32, distance: u8, startup: bool) -> Self {
        Self {
            timestamp,
            counter,
            distance,
            startup,
        }
    }
}

/// Why a sample only (re)established the counter baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineReason {
    /// First sample since the tracker was created or reset
    Uninitialized,
    /// Counter below the previous value: sensor reset or counter overflow
    CounterRegressed { previous: i32, current: i32 },
}

/// What a reconciliation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The sample only set the counter baseline
    Baseline(BaselineReason),
    /// The sample is older than the last update; history was left alone.
    /// `strikes` new strikes were still recorded as the last event.
    ClockAnomaly { elapsed_secs: i64, strikes: u32 },
    /// History was updated with the strikes since the previous sample
    Updated {
        strikes: u32,
        /// A full history window had passed, all older buckets were dropped
        window_expired: bool,
        /// Buckets marked as having no data because no sample covered them
        skipped_buckets: usize,
    },
}

/// Result of [`LightningTracker::reconcile`]
///
/// The outcome is always valid; `persisted` reports whether the updated
/// state also reached storage.
#[derive(Debug)]
pub struct Reconciliation<E: core::fmt::Debug> {
    pub outcome: ReconcileOutcome,
    pub persisted: Result<(), PersistenceError<E>>,
}

/// Lightning sensor post-processing
///
/// Owns the persisted [`LightningState`] and the store it is saved to.
/// Samples must be fed one at a time; see [`SharedTracker`](crate::shared::SharedTracker)
/// for access from several tasks.
pub struct LightningTracker<S: RecordStore> {
    config: LightningConfig,
    state: LightningState,
    store: StateStore<S>,
}

impl<S: RecordStore> LightningTracker<S> {
    /// Create a tracker with default state. Nothing is read from `store`
    /// until [`load`](Self::load) is called.
    pub fn new(config: LightningConfig, store: S) -> Self {
        Self {
            config,
            state: LightningState::new(config),
            store: StateStore::new(store),
        }
    }

    /// Restore the state saved by a previous run.
    ///
    /// On failure the current in-memory state is kept, so the tracker stays
    /// usable (without persistence) and the error is only informative.
    pub fn load(&mut self) -> Result<(), PersistenceError<S::Error>> {
        match self.store.load(&self.config) {
            Ok(state) => {
                info!(" Restored lightning state: {}", state);
                self.state = state;
                Ok(())
            }
            Err(e) => {
                error!(" Failed to load lightning state: {}", e);
                Err(e)
            }
        }
    }

    /// Persist the current state
    pub fn save(&mut self) -> Result<(), PersistenceError<S::Error>> {
        let result = self.store.save(&self.state);
        if let Err(e) = &result {
            error!(" Failed to save lightning state: {}", e);
        }
        result
    }

    pub fn config(&self) -> &LightningConfig {
        &self.config
    }

    pub fn state(&self) -> &LightningState {
        &self.state
    }

    pub fn store(&self) -> &S {
        self.store.backend()
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.store.backend_mut()
    }

    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    /// Process one sensor sample.
    pub fn reconcile(&mut self, sample: LightningSample) -> Reconciliation<S::Error> {
        let outcome = self.apply(sample);
        let persisted = match outcome {
            // Nothing changed unless an event was recorded before the clock
            // check failed
            ReconcileOutcome::ClockAnomaly { strikes: 0, .. } => Ok(()),
            _ => self.save(),
        };
        Reconciliation { outcome, persisted }
    }

    fn apply(&mut self, sample: LightningSample) -> ReconcileOutcome {
        let LightningSample {
            timestamp,
            counter,
            distance,
            startup: _,
        } = sample;

        let prev = match self.state.prev_counter {
            None => {
                self.init_history(Some(0));
                self.state.prev_counter = Some(counter);
                info!(" Lightning counter baseline set to {}", counter);
                return ReconcileOutcome::Baseline(BaselineReason::Uninitialized);
            }
            Some(prev) if counter < prev => {
                warn!(
                    " Lightning counter dropped from {} to {} (sensor reset or overflow)",
                    prev, counter
                );
                self.state.prev_counter = Some(counter);
                return ReconcileOutcome::Baseline(BaselineReason::CounterRegressed {
                    previous: prev,
                    current: counter,
                });
            }
            Some(prev) => prev,
        };

        // counter >= prev, so the difference is non-negative and fits u32
        let strikes = counter.abs_diff(prev);
        if strikes > 0 {
            self.state.last_event = Some(LastEvent {
                timestamp,
                count: strikes,
                distance,
            });
            self.state.prev_counter = Some(counter);
            debug!(" {} new strike(s), distance {} km", strikes, distance);
        }

        let elapsed_secs = timestamp.saturating_sub(self.state.last_update);
        if elapsed_secs < 0 {
            warn!(
                " Negative time span since last update ({} s), history not updated",
                elapsed_secs
            );
            return ReconcileOutcome::ClockAnomaly {
                elapsed_secs,
                strikes,
            };
        }

        let history = &mut self.state.history;
        let window_expired = elapsed_secs >= self.config.interval.window_secs();
        if window_expired {
            warn!(" History time frame expired, resetting!");
            history.reset_all(Some(0));
        }

        let skipped_buckets = history.invalidate_range(self.state.last_update, timestamp);
        history.set(timestamp, strikes);
        debug!(
            " hist[{}]={} ({} skipped)",
            history.bucket_index(timestamp),
            strikes,
            skipped_buckets
        );
        trace!(" {}", history);

        self.state.last_update = timestamp;

        ReconcileOutcome::Updated {
            strikes,
            window_expired,
            skipped_buckets,
        }
    }

    /// Forget the counter baseline and the last event.
    ///
    /// The history is kept; call [`init_history`](Self::init_history) as
    /// well for a clean slate. The next sample sets a new baseline.
    pub fn reset(&mut self) {
        self.state.reset();
        info!(" Lightning tracker reset");
    }

    /// Set every history bucket to `fill`.
    ///
    /// Independent of the counter baseline; `None` marks the whole past hour
    /// as having no data.
    pub fn init_history(&mut self, fill: Bucket) {
        if self.state.history.matches(&self.config) {
            self.state.history.reset_all(fill);
        } else {
            self.state.history = HistoryRing::new(self.config, fill);
        }
    }

    /// The last sample that reported new strikes, if any since the last reset
    pub fn last_event(&self) -> Option<LastEvent> {
        self.state.last_event
    }

    /// Strikes over the past hour, `None` if no interval has valid data
    pub fn past_hour(&self) -> Option<u32> {
        self.state.history.sum_valid()
    }

    /// Strikes over the hour ending at `now`.
    ///
    /// Unlike [`past_hour`](Self::past_hour), intervals that have elapsed
    /// since the last update count as having no data, so the result goes to
    /// `None` once a full hour passes without samples.
    pub fn past_hour_at(&self, now: Timestamp) -> Option<u32> {
        if now < self.state.last_update {
            return self.past_hour();
        }
        let mut history = self.state.history.clone();
        history.invalidate_through(self.state.last_update, now);
        history.sum_valid()
    }
}
