//! Tracker access from several tasks
//!
//! On the device the sensor task reconciles samples while the display and
//! uplink tasks only query. [`SharedTracker`] serializes both behind a
//! critical-section mutex, so a query never observes a half-applied
//! reconciliation.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use crate::history::Bucket;
use crate::state::LastEvent;
use crate::storage::RecordStore;
use crate::time::Timestamp;
use crate::tracker::{LightningSample, LightningTracker, Reconciliation};

pub struct SharedTracker<S: RecordStore> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<LightningTracker<S>>>,
}

impl<S: RecordStore> SharedTracker<S> {
    pub const fn new(tracker: LightningTracker<S>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(tracker)),
        }
    }

    /// Run `f` with exclusive access to the tracker
    pub fn with<R>(&self, f: impl FnOnce(&mut LightningTracker<S>) -> R) -> R {
        self.inner.lock(|tracker| f(&mut tracker.borrow_mut()))
    }

    pub fn reconcile(&self, sample: LightningSample) -> Reconciliation<S::Error> {
        self.with(|tracker| tracker.reconcile(sample))
    }

    pub fn reset(&self) {
        self.with(|tracker| tracker.reset());
    }

    pub fn init_history(&self, fill: Bucket) {
        self.with(|tracker| tracker.init_history(fill));
    }

    pub fn last_event(&self) -> Option<LastEvent> {
        self.inner.lock(|tracker| tracker.borrow().last_event())
    }

    pub fn past_hour(&self) -> Option<u32> {
        self.inner.lock(|tracker| tracker.borrow().past_hour())
    }

    pub fn past_hour_at(&self, now: Timestamp) -> Option<u32> {
        self.inner.lock(|tracker| tracker.borrow().past_hour_at(now))
    }

    pub fn into_inner(self) -> LightningTracker<S> {
        self.inner.into_inner().into_inner()
    }
}
