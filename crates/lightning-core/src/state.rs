//! Tracker state that survives restarts and deep sleep

use core::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::config::LightningConfig;
use crate::history::HistoryRing;
use crate::time::Timestamp;

/// The most recent reconciliation that saw new strikes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LastEvent {
    /// Timestamp of the sample that reported the strikes
    pub timestamp: Timestamp,
    /// Strikes counted since the previous sample
    pub count: u32,
    /// Estimated distance of the latest strike in km (0-255)
    pub distance: u8,
}

/// Persisted tracker record
///
/// Single instance per device, mutated only by the tracker's reconciliation
/// and reset operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningState {
    /// Timestamp of the last reconciliation that updated the history (0 = never)
    pub last_update: Timestamp,
    /// Last raw counter value seen, `None` until the first sample
    pub prev_counter: Option<i32>,
    /// Last recorded event, `None` after a reset
    pub last_event: Option<LastEvent>,
    /// Strike counts for the past hour
    pub history: HistoryRing,
}

impl LightningState {
    /// Field-wise defaults used when no record has been stored yet
    pub fn new(layout: LightningConfig) -> Self {
        Self {
            last_update: 0,
            prev_counter: None,
            last_event: Some(LastEvent::default()),
            history: HistoryRing::new(layout, Some(0)),
        }
    }

    /// Forget the counter baseline and the last event.
    ///
    /// History is left untouched; callers that want a clean history must
    /// also reinitialize it.
    pub fn reset(&mut self) {
        self.last_update = 0;
        self.prev_counter = None;
        self.last_event = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.prev_counter.is_some()
    }
}

impl Display for LightningState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[LightningState] last_update: {}, ", self.last_update)?;
        match self.prev_counter {
            Some(counter) => write!(f, "prev_counter: {counter}, ")?,
            None => write!(f, "prev_counter: -, ")?,
        }
        match self.last_event {
            Some(event) => write!(
                f,
                "last_event: {} strike(s) at {}, {} km",
                event.count, event.timestamp, event.distance
            ),
            None => write!(f, "last_event: -"),
        }
    }
}
