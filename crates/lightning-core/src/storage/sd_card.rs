use core::fmt::{Debug, Write};

use embedded_sdmmc::{BlockDevice, File, Mode, TimeSource, VolumeIdx, VolumeManager};
use heapless::String;
use log::warn;
use thiserror_no_std::Error;

use super::RecordStore;

const MAX_DIRS: usize = 4;
const MAX_FILES: usize = 4;
const MAX_VOLUMES: usize = 1;

/// Slot header: generation (u32 LE) followed by record length (u16 LE)
const HEADER_LEN: usize = 6;

/// 8.3 file name: up to 8 characters, a dot and a 1-3 character extension
type FileName = String<12>;

#[derive(Debug, Error)]
pub enum SdStoreError<E: Debug> {
    #[error("SD card error: {0:?}")]
    Card(embedded_sdmmc::Error<E>),
    #[error("Record key is not a valid 8.3 file name stem")]
    InvalidKey,
    #[error("Record of {len} bytes is too large")]
    RecordTooLarge { len: usize },
    #[error("Record of {len} bytes does not fit the read buffer")]
    BufferTooSmall { len: usize },
}

impl<E: Debug> From<embedded_sdmmc::Error<E>> for SdStoreError<E> {
    fn from(value: embedded_sdmmc::Error<E>) -> Self {
        Self::Card(value)
    }
}

/// One of the two files a record alternates between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    A,
    B,
}

impl Slot {
    const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    const fn extension(self) -> &'static str {
        match self {
            Self::A => "RA",
            Self::B => "RB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotHeader {
    generation: u32,
    len: usize,
}

fn slot_file_name(key: &str, slot: Slot) -> Option<FileName> {
    if key.is_empty() || key.len() > 8 || key.contains('.') {
        return None;
    }
    let mut name = FileName::new();
    write!(name, "{}.{}", key, slot.extension()).ok()?;
    Some(name)
}

fn encode_header(generation: u32, len: u16) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&generation.to_le_bytes());
    header[4..6].copy_from_slice(&len.to_le_bytes());
    header
}

/// Parse a slot header, rejecting slots whose file length does not match
/// (a write that was cut short)
fn decode_header(header: &[u8; HEADER_LEN], file_len: u32) -> Option<SlotHeader> {
    let generation = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = usize::from(u16::from_le_bytes([header[4], header[5]]));
    (file_len as usize == HEADER_LEN + len).then_some(SlotHeader { generation, len })
}

/// Pick the slot holding the newest complete record
fn newest(a: Option<SlotHeader>, b: Option<SlotHeader>) -> Option<(Slot, SlotHeader)> {
    match (a, b) {
        (Some(a), Some(b)) if b.generation > a.generation => Some((Slot::B, b)),
        (Some(a), _) => Some((Slot::A, a)),
        (None, Some(b)) => Some((Slot::B, b)),
        (None, None) => None,
    }
}

fn read_full<D, T>(
    file: &File<'_, D, T, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
    buf: &mut [u8],
) -> Result<usize, embedded_sdmmc::Error<D::Error>>
where
    D: BlockDevice,
    T: TimeSource,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break; // EOF
        }
        filled += n;
    }
    Ok(filled)
}

/// Record store on a FAT-formatted SD card
///
/// Each record alternates between two files, `<KEY>.RA` and `<KEY>.RB`, each
/// prefixed with a generation number. A write always goes to the slot that
/// does not hold the newest record, so a write cut short by power loss
/// leaves the previous record readable.
///
/// Like the display, these operations block the SPI bus while they run.
pub struct SdCardStore<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<D, T, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
}

impl<D, T> SdCardStore<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    /// Create a store on the first volume of `block_device`
    pub fn new(block_device: D, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(block_device, ts);

        Self { volume_mgr }
    }

    /// Header of the record in `file_name`, `None` if absent or incomplete
    fn read_header(
        &self,
        file_name: &str,
    ) -> Result<Option<SlotHeader>, embedded_sdmmc::Error<D::Error>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        let file = match root_dir.open_file_in_dir(file_name, Mode::ReadOnly) {
            Ok(file) => file,
            Err(embedded_sdmmc::Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut header = [0u8; HEADER_LEN];
        let read = read_full(&file, &mut header)?;
        let slot = if read == HEADER_LEN {
            decode_header(&header, file.length())
        } else {
            None
        };

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(slot)
    }

    fn newest_slot(
        &self,
        key: &str,
    ) -> Result<Option<(Slot, SlotHeader)>, SdStoreError<D::Error>> {
        let name_a = slot_file_name(key, Slot::A).ok_or(SdStoreError::InvalidKey)?;
        let name_b = slot_file_name(key, Slot::B).ok_or(SdStoreError::InvalidKey)?;
        let a = self.read_header(&name_a)?;
        let b = self.read_header(&name_b)?;
        Ok(newest(a, b))
    }
}

impl<D, T> RecordStore for SdCardStore<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    type Error = SdStoreError<D::Error>;

    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        let Some((slot, header)) = self.newest_slot(key)? else {
            return Ok(None);
        };
        let file_name = slot_file_name(key, slot).ok_or(SdStoreError::InvalidKey)?;
        let len = buf.len();
        let dest = buf
            .get_mut(..header.len)
            .ok_or(SdStoreError::BufferTooSmall { len })?;

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(file_name.as_str(), Mode::ReadOnly)?;

        // Skip the header, it was validated by newest_slot()
        let mut skip = [0u8; HEADER_LEN];
        read_full(&file, &mut skip)?;
        let read = read_full(&file, dest)?;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        if read < header.len {
            warn!(" Record {} shrank while reading", file_name);
            return Ok(None);
        }
        Ok(Some(header.len))
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), Self::Error> {
        let len = u16::try_from(bytes.len())
            .map_err(|_| SdStoreError::RecordTooLarge { len: bytes.len() })?;

        let (target, generation) = match self.newest_slot(key)? {
            Some((slot, header)) => (slot.other(), header.generation.wrapping_add(1)),
            None => (Slot::A, 0),
        };
        let file_name = slot_file_name(key, target).ok_or(SdStoreError::InvalidKey)?;

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file =
            root_dir.open_file_in_dir(file_name.as_str(), Mode::ReadWriteCreateOrTruncate)?;

        file.write(&encode_header(generation, len))?;
        file.write(bytes)?;

        // Explicitly close them to handle errors; closing flushes the
        // directory entry, which is what makes the new slot valid
        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }
}
