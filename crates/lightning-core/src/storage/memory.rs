use heapless::{String, Vec};
use thiserror_no_std::Error;

use super::{RECORD_CAPACITY, RecordStore};

/// Longest accepted record key
pub const MAX_KEY_LEN: usize = 16;

/// Number of distinct keys a [`MemoryStore`] can hold
pub const MAX_RECORDS: usize = 4;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("Record key too long")]
    KeyTooLong,
    #[error("Record of {len} bytes exceeds capacity")]
    RecordTooLarge { len: usize },
    #[error("Read buffer of {len} bytes is too small")]
    BufferTooSmall { len: usize },
    #[error("All record slots are in use")]
    Full,
    #[error("Write rejected")]
    WriteRejected,
}

/// Record store kept in RAM
///
/// On devices whose RTC memory is retained through deep sleep, a
/// `MemoryStore` placed there keeps the tracker record across sleep cycles
/// (but not across power loss). Writes replace a slot in one step, so a
/// failed write leaves the previous record intact.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Vec<(String<MAX_KEY_LEN>, Vec<u8, RECORD_CAPACITY>), MAX_RECORDS>,
    fail_writes: bool,
}

impl MemoryStore {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            fail_writes: false,
        }
    }

    /// Make every following write fail, to exercise persistence failure paths
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Raw bytes stored under `key`
    pub fn record(&self, key: &str) -> Option<&[u8]> {
        self.slots
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, record)| record.as_slice())
    }
}

impl RecordStore for MemoryStore {
    type Error = MemoryStoreError;

    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        let Some(record) = self.record(key) else {
            return Ok(None);
        };
        let len = buf.len();
        let dest = buf
            .get_mut(..record.len())
            .ok_or(MemoryStoreError::BufferTooSmall { len })?;
        dest.copy_from_slice(record);
        Ok(Some(record.len()))
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(MemoryStoreError::WriteRejected);
        }

        let record = Vec::from_slice(bytes)
            .map_err(|_| MemoryStoreError::RecordTooLarge { len: bytes.len() })?;

        if let Some((_, slot)) = self.slots.iter_mut().find(|(k, _)| k.as_str() == key) {
            *slot = record;
            return Ok(());
        }

        let key = String::try_from(key).map_err(|_| MemoryStoreError::KeyTooLong)?;
        self.slots
            .push((key, record))
            .map_err(|_| MemoryStoreError::Full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_key() {
        let mut store = MemoryStore::new();
        let mut buf = [0u8; 8];
        assert_eq!(store.read("absent", &mut buf), Ok(None));
    }

    #[test]
    fn test_write_replaces_record() {
        let mut store = MemoryStore::new();
        store.write("a", &[1, 2, 3]).unwrap();
        store.write("a", &[9]).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(store.read("a", &mut buf), Ok(Some(1)));
        assert_eq!(buf[0], 9);
        assert_eq!(store.record("a"), Some(&[9u8][..]));
    }

    #[test]
    fn test_limits() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.write("a-key-that-is-far-too-long", &[0]),
            Err(MemoryStoreError::KeyTooLong)
        );
        assert_eq!(
            store.write("big", &[0u8; RECORD_CAPACITY + 1]),
            Err(MemoryStoreError::RecordTooLarge {
                len: RECORD_CAPACITY + 1
            })
        );

        for key in ["k0", "k1", "k2", "k3"] {
            store.write(key, &[1]).unwrap();
        }
        assert_eq!(store.write("k4", &[1]), Err(MemoryStoreError::Full));

        store.write("k0", &[1, 2, 3, 4]).unwrap();
        let mut small = [0u8; 2];
        assert_eq!(
            store.read("k0", &mut small),
            Err(MemoryStoreError::BufferTooSmall { len: 2 })
        );
    }

    #[test]
    fn test_failed_write_keeps_previous_record() {
        let mut store = MemoryStore::new();
        store.write("a", &[7]).unwrap();
        store.fail_writes(true);
        assert_eq!(store.write("a", &[8]), Err(MemoryStoreError::WriteRejected));
        assert_eq!(store.record("a"), Some(&[7u8][..]));
    }
}
