//! Record store backed by plain files, one per key

use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use lightning_core::RecordStore;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir` for records, creating it if needed
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Remove every record in the store directory
    pub fn clear(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "rec") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.rec"))
    }
}

impl RecordStore for FileStore {
    type Error = io::Error;

    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        let mut file = match fs::File::open(self.path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let len = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        if len > buf.len() {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("record of {len} bytes exceeds {} byte buffer", buf.len()),
            ));
        }
        file.read_exact(&mut buf[..len])?;
        Ok(Some(len))
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), Self::Error> {
        // Write aside and rename over the old record, so a crash mid-write
        // leaves the previous record in place
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "lightning-file-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_missing_record() {
        let dir = scratch_dir("missing");
        let mut store = FileStore::open(&dir).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(store.read("LIGHTNG", &mut buf).unwrap(), None);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_write_then_read() {
        let dir = scratch_dir("rw");
        let mut store = FileStore::open(&dir).unwrap();
        store.write("LIGHTNG", &[1, 2, 3]).unwrap();
        store.write("LIGHTNG", &[4, 5]).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(store.read("LIGHTNG", &mut buf).unwrap(), Some(2));
        assert_eq!(&buf[..2], &[4, 5]);
        assert!(!dir.join("LIGHTNG.tmp").exists());

        store.clear().unwrap();
        assert_eq!(store.read("LIGHTNG", &mut buf).unwrap(), None);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_oversized_record_is_rejected() {
        let dir = scratch_dir("oversized");
        let mut store = FileStore::open(&dir).unwrap();
        store.write("LIGHTNG", &[0u8; 32]).unwrap();

        let mut buf = [0u8; 16];
        let err = store.read("LIGHTNG", &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_tracker_round_trip() {
        use lightning_core::{LightningConfig, LightningSample, LightningTracker};

        let dir = scratch_dir("tracker");
        let config = LightningConfig::with_interval_minutes(5).unwrap();

        let mut tracker = LightningTracker::new(config, FileStore::open(&dir).unwrap());
        tracker.reconcile(LightningSample::new(0, 4, 0, true));
        assert!(tracker.reconcile(LightningSample::new(300, 9, 14, false)).persisted.is_ok());

        let mut restored = LightningTracker::new(config, FileStore::open(&dir).unwrap());
        restored.load().unwrap();
        assert_eq!(restored.state(), tracker.state());
        assert_eq!(restored.past_hour(), Some(5));
        fs::remove_dir_all(dir).unwrap();
    }
}
