//! Hardware-independent core library for lightning strike tracking
//!
//! A lightning sensor only exposes a running strike counter, the estimated
//! distance of the latest strike and a startup flag. This crate turns
//! periodic readings of those into the last event (strikes since the previous
//! reading, when, how far) and the number of strikes over the past hour,
//! keeping a small record that survives restarts and deep sleep.
//!
//! It is `#![no_std]` so it compiles on both embedded targets and desktop
//! hosts (for the simulator and tests).

#![no_std]

pub mod config;
pub mod history;
pub mod shared;
pub mod state;
pub mod storage;
pub mod time;
pub mod tracker;

pub use config::{ConfigError, LightningConfig, UpdateInterval};
pub use history::{Bucket, HistoryRing};
pub use shared::SharedTracker;
pub use state::{LastEvent, LightningState};
pub use storage::{MemoryStore, PersistenceError, RecordStore, StateStore};
pub use tracker::{
    BaselineReason, LightningSample, LightningTracker, ReconcileOutcome, Reconciliation,
};
