//! Persistence of the tracker record
//!
//! The whole [`LightningState`] is stored as one small binary record: a
//! format version byte followed by the postcard encoding of the state.
//! Where the bytes end up is up to the [`RecordStore`] backend.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: RAM slots (RTC RAM on devices that keep it through deep
//!   sleep, and the test double)
//! - [`SdCardStore`]: one FAT file per record on an SD card (`sdcard` feature)

pub mod memory;
#[cfg(feature = "sdcard")]
pub mod sd_card;

pub use memory::*;
#[cfg(feature = "sdcard")]
pub use sd_card::*;

use core::fmt::Debug;

use log::{debug, warn};
use thiserror_no_std::Error;

use crate::config::LightningConfig;
use crate::history::HistoryRing;
use crate::state::LightningState;

/// Key under which the tracker record is stored
pub const STORAGE_NAMESPACE: &str = "LIGHTNG";

/// Format version written as the first byte of every record
pub const RECORD_VERSION: u8 = 1;

/// Largest encoded record, with room to spare
///
/// Worst case is ~400 bytes: 60 buckets of up to 6 bytes each plus the
/// scalar fields at their maximum varint width.
pub const RECORD_CAPACITY: usize = 512;

/// Byte-level storage for named records
pub trait RecordStore {
    type Error: Debug;

    /// Read the record stored under `key` into `buf`.
    ///
    /// Returns the record length, or `None` if nothing has been stored under
    /// `key` yet.
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error>;

    /// Replace the record stored under `key`.
    ///
    /// A later `read` must observe either the previous record or all of
    /// `bytes`, never a mix.
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum PersistenceError<E: Debug> {
    #[error("Storage backend error: {0:?}")]
    Backend(E),
    #[error("Record encoding failed: {0}")]
    Encode(postcard::Error),
    #[error("Record decoding failed: {0}")]
    Decode(postcard::Error),
    #[error("Unsupported record version {0}")]
    UnsupportedVersion(u8),
    #[error("Stored record is empty")]
    Truncated,
}

/// Encode `state` into `buf`, returning the record length
pub fn encode_record(state: &LightningState, buf: &mut [u8]) -> Result<usize, postcard::Error> {
    let (version, body) = buf
        .split_first_mut()
        .ok_or(postcard::Error::SerializeBufferFull)?;
    *version = RECORD_VERSION;
    let used = postcard::to_slice(state, body)?;
    Ok(used.len() + 1)
}

/// Loads and saves the tracker record through a [`RecordStore`]
pub struct StateStore<S: RecordStore> {
    backend: S,
}

impl<S: RecordStore> StateStore<S> {
    pub const fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    pub fn into_inner(self) -> S {
        self.backend
    }

    /// Load the stored record, or the defaults for `layout` if none exists.
    ///
    /// A record written under a different history layout keeps its counter
    /// and last-event fields, but its history is rebuilt for `layout`.
    pub fn load(
        &mut self,
        layout: &LightningConfig,
    ) -> Result<LightningState, PersistenceError<S::Error>> {
        let mut buf = [0u8; RECORD_CAPACITY];
        let len = match self
            .backend
            .read(STORAGE_NAMESPACE, &mut buf)
            .map_err(PersistenceError::Backend)?
        {
            Some(len) => len.min(RECORD_CAPACITY),
            None => {
                debug!(" No stored lightning record, using defaults");
                return Ok(LightningState::new(*layout));
            }
        };

        let (&version, body) = buf[..len]
            .split_first()
            .ok_or(PersistenceError::Truncated)?;
        if version != RECORD_VERSION {
            return Err(PersistenceError::UnsupportedVersion(version));
        }

        let mut state: LightningState =
            postcard::from_bytes(body).map_err(PersistenceError::Decode)?;

        if !state.history.matches(layout) {
            warn!(
                " Stored history layout {:?} differs from {:?}, rebuilding history",
                state.history.layout(),
                layout
            );
            state.history = HistoryRing::new(*layout, Some(0));
        }

        debug!(" Loaded {}", state);
        Ok(state)
    }

    /// Persist the full record
    pub fn save(&mut self, state: &LightningState) -> Result<(), PersistenceError<S::Error>> {
        let mut buf = [0u8; RECORD_CAPACITY];
        let len = encode_record(state, &mut buf).map_err(PersistenceError::Encode)?;

        self.backend
            .write(STORAGE_NAMESPACE, &buf[..len])
            .map_err(PersistenceError::Backend)?;

        debug!(" Saved {} ({} bytes)", state, len);
        Ok(())
    }
}
