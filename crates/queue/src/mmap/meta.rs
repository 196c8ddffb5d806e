//! Partition metadata page
//!
//! One page, little-endian 8-byte slots:
//!
//! ```text
//!  0- 7  version (currently 1)
//!  8-15  writing segmentId      16-23  writing byteOffset
//! 24-31  watermark segmentId    32-39  watermark byteOffset
//! 40-47  committed segmentId    48-55  committed byteOffset
//! 56-63  reading segmentId      64-71  reading byteOffset
//! 72-79  capacity (queueCapacitySegments)
//! ```

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use parking_lot::Mutex;
use satellite_protocol::Position;

use crate::error::{QueueError, Result};

/// Meta file name inside a partition directory
pub const META_FILE: &str = "meta.dat";

/// Meta page size
pub const PAGE_SIZE: u64 = 4096;

/// Current meta layout version
pub const META_VERSION: u64 = 1;

const VERSION_AT: usize = 0;
const WRITING_AT: usize = 8;
const WATERMARK_AT: usize = 24;
const COMMITTED_AT: usize = 40;
const READING_AT: usize = 56;
const CAPACITY_AT: usize = 72;

/// Which offset pair to address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Writing,
    Watermark,
    Committed,
    Reading,
}

impl Cursor {
    const fn at(self) -> usize {
        match self {
            Self::Writing => WRITING_AT,
            Self::Watermark => WATERMARK_AT,
            Self::Committed => COMMITTED_AT,
            Self::Reading => READING_AT,
        }
    }
}

/// Memory-mapped metadata page
pub struct Meta {
    path: PathBuf,
    page: Mutex<MmapMut>,
}

impl Meta {
    /// Open or create the meta file, checking version and capacity
    ///
    /// Returns the meta and whether it was freshly created.
    pub fn open(dir: &Path, capacity: u64) -> Result<(Self, bool)> {
        let path = dir.join(META_FILE);
        let created = !path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| QueueError::io(&path, e))?;
        if created {
            file.set_len(PAGE_SIZE)
                .map_err(|e| QueueError::io(&path, e))?;
        } else {
            let len = file
                .metadata()
                .map_err(|e| QueueError::io(&path, e))?
                .len();
            if len < PAGE_SIZE {
                return Err(QueueError::MetaMismatch {
                    path,
                    field: "size",
                    found: len,
                    expected: PAGE_SIZE,
                });
            }
        }

        // SAFETY: the partition directory is owned exclusively by this queue
        // instance and the file stays open for the lifetime of the mapping.
        #[allow(unsafe_code)]
        let page = unsafe { MmapMut::map_mut(&file) }.map_err(|e| QueueError::io(&path, e))?;

        let meta = Self {
            path,
            page: Mutex::new(page),
        };

        if created {
            meta.write_u64(VERSION_AT, META_VERSION);
            meta.write_u64(CAPACITY_AT, capacity);
            meta.flush()?;
        } else {
            meta.check("version", meta.read_u64(VERSION_AT), META_VERSION)?;
            meta.check("capacity", meta.read_u64(CAPACITY_AT), capacity)?;
        }
        Ok((meta, created))
    }

    fn check(&self, field: &'static str, found: u64, expected: u64) -> Result<()> {
        if found != expected {
            return Err(QueueError::MetaMismatch {
                path: self.path.clone(),
                field,
                found,
                expected,
            });
        }
        Ok(())
    }

    fn read_u64(&self, at: usize) -> u64 {
        let page = self.page.lock();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&page[at..at + 8]);
        u64::from_le_bytes(raw)
    }

    fn write_u64(&self, at: usize, value: u64) {
        let mut page = self.page.lock();
        page[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Read an offset pair
    pub fn get(&self, cursor: Cursor) -> Position {
        let at = cursor.at();
        let page = self.page.lock();
        let mut seg = [0u8; 8];
        let mut off = [0u8; 8];
        seg.copy_from_slice(&page[at..at + 8]);
        off.copy_from_slice(&page[at + 8..at + 16]);
        Position::new(u64::from_le_bytes(seg), u64::from_le_bytes(off))
    }

    /// Store an offset pair
    pub fn set(&self, cursor: Cursor, pos: Position) {
        let at = cursor.at();
        let mut page = self.page.lock();
        page[at..at + 8].copy_from_slice(&pos.segment_id.to_le_bytes());
        page[at + 8..at + 16].copy_from_slice(&pos.byte_offset.to_le_bytes());
    }

    /// Synchronously flush the page to disk
    pub fn flush(&self) -> Result<()> {
        self.page
            .lock()
            .flush()
            .map_err(|e| QueueError::io(&self.path, e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (meta, created) = Meta::open(dir.path(), 8).unwrap();
            assert!(created);
            assert_eq!(meta.get(Cursor::Writing), Position::default());
            meta.set(Cursor::Watermark, Position::new(3, 100));
            meta.set(Cursor::Committed, Position::new(2, 40));
            meta.flush().unwrap();
        }

        let (meta, created) = Meta::open(dir.path(), 8).unwrap();
        assert!(!created);
        assert_eq!(meta.get(Cursor::Watermark), Position::new(3, 100));
        assert_eq!(meta.get(Cursor::Committed), Position::new(2, 40));
    }

    #[test]
    fn test_capacity_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        drop(Meta::open(dir.path(), 8).unwrap());

        let err = Meta::open(dir.path(), 16).err().unwrap();
        assert!(matches!(
            err,
            QueueError::MetaMismatch { field: "capacity", found: 8, expected: 16, .. }
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (meta, _) = Meta::open(dir.path(), 4).unwrap();
            meta.write_u64(VERSION_AT, 7);
            meta.flush().unwrap();
        }
        let err = Meta::open(dir.path(), 4).err().unwrap();
        assert!(matches!(err, QueueError::MetaMismatch { field: "version", .. }));
    }

    #[test]
    fn test_layout_is_little_endian_at_fixed_offsets() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (meta, _) = Meta::open(dir.path(), 5).unwrap();
            meta.set(Cursor::Reading, Position::new(0x0102, 0x0304));
            meta.flush().unwrap();
        }
        let raw = std::fs::read(dir.path().join(META_FILE)).unwrap();
        assert_eq!(raw.len(), PAGE_SIZE as usize);
        assert_eq!(&raw[0..8], &1u64.to_le_bytes());
        assert_eq!(&raw[56..64], &0x0102u64.to_le_bytes());
        assert_eq!(&raw[64..72], &0x0304u64.to_le_bytes());
        assert_eq!(&raw[72..80], &5u64.to_le_bytes());
    }
}
