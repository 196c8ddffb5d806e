//! Segment ring
//!
//! Segments are fixed-size files named `<index>_segment.dat`. A logical
//! segment id maps to the physical file `id % capacity`. Each physical index
//! has its own lock guarding map/unmap, and the number of live mappings is
//! capped: a caller that would exceed the cap must wait for the swapper.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use memmap2::MmapMut;
use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::error::{QueueError, Result};
use crate::metrics::QueueMetrics;

/// How long a blocked mapper waits before re-signalling the swapper
const ROOM_WAIT: Duration = Duration::from_millis(50);

/// File name of a physical segment
pub fn segment_file_name(index: u64) -> String {
    format!("{index}_segment.dat")
}

struct Slot {
    segment_id: u64,
    map: Option<MmapMut>,
}

/// The mapped working set of one partition
pub struct SegmentRing {
    dir: PathBuf,
    segment_size: u64,
    capacity: u64,
    max_mapped: usize,
    slots: Vec<Mutex<Slot>>,
    mapped: AtomicUsize,
    room: Mutex<()>,
    room_freed: Condvar,
    closed: AtomicBool,
    metrics: QueueMetrics,
}

impl SegmentRing {
    /// Create the ring, pre-sizing every segment file
    pub fn create(
        dir: &Path,
        segment_size: u64,
        capacity: u64,
        max_mapped: usize,
        metrics: QueueMetrics,
    ) -> Result<Self> {
        for index in 0..capacity {
            let path = dir.join(segment_file_name(index));
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| QueueError::io(&path, e))?;
            let len = file.metadata().map_err(|e| QueueError::io(&path, e))?.len();
            if len != segment_size {
                file.set_len(segment_size)
                    .map_err(|e| QueueError::io(&path, e))?;
            }
        }

        let slots = (0..capacity)
            .map(|_| {
                Mutex::new(Slot {
                    segment_id: 0,
                    map: None,
                })
            })
            .collect();

        Ok(Self {
            dir: dir.to_path_buf(),
            segment_size,
            capacity,
            max_mapped,
            slots,
            mapped: AtomicUsize::new(0),
            room: Mutex::new(()),
            room_freed: Condvar::new(),
            closed: AtomicBool::new(false),
            metrics,
        })
    }

    #[inline]
    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    #[inline]
    pub fn mapped_count(&self) -> usize {
        self.mapped.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max_mapped(&self) -> usize {
        self.max_mapped
    }

    fn slot_index(&self, segment_id: u64) -> usize {
        (segment_id % self.capacity) as usize
    }

    fn path_of(&self, segment_id: u64) -> PathBuf {
        self.dir
            .join(segment_file_name(segment_id % self.capacity))
    }

    /// Run `f` against the bytes of `segment_id`, mapping it if needed
    ///
    /// Blocks while the mapping cap is reached; `on_pressure` is invoked each
    /// time the caller has to wait so the swapper can make room.
    pub fn with_segment<R>(
        &self,
        segment_id: u64,
        on_pressure: &dyn Fn(),
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        let mut f = Some(f);
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(QueueError::Closed);
            }
            {
                let mut slot = self.slots[self.slot_index(segment_id)].lock();
                if slot.segment_id != segment_id && slot.map.is_some() {
                    // Previous lap of the ring still mapped
                    self.unmap_locked(&mut slot)?;
                }
                if slot.map.is_none() && self.try_reserve() {
                    match self.map_file(segment_id) {
                        Ok(map) => {
                            slot.segment_id = segment_id;
                            slot.map = Some(map);
                            self.metrics.mapped.inc();
                        }
                        Err(e) => {
                            self.release();
                            return Err(e);
                        }
                    }
                }
                if let Some(map) = slot.map.as_mut() {
                    let f = f.take().ok_or(QueueError::Closed)?;
                    return Ok(f(&mut map[..]));
                }
            }
            on_pressure();
            self.wait_for_room();
        }
    }

    fn try_reserve(&self) -> bool {
        self.mapped
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_mapped).then_some(n + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.mapped.fetch_sub(1, Ordering::AcqRel);
        let _guard = self.room.lock();
        self.room_freed.notify_all();
    }

    fn wait_for_room(&self) {
        let mut guard = self.room.lock();
        if self.mapped_count() >= self.max_mapped && !self.closed.load(Ordering::Acquire) {
            self.room_freed.wait_for(&mut guard, ROOM_WAIT);
        }
    }

    fn map_file(&self, segment_id: u64) -> Result<MmapMut> {
        let path = self.path_of(segment_id);
        let attempt = || -> std::io::Result<MmapMut> {
            let file = OpenOptions::new().read(true).write(true).open(&path)?;
            // SAFETY: segment files are owned exclusively by this partition and
            // are never truncated while mapped; the slot lock serialises access.
            #[allow(unsafe_code)]
            let map = unsafe { MmapMut::map_mut(&file)? };
            Ok(map)
        };
        match attempt() {
            Ok(map) => Ok(map),
            Err(first) => {
                warn!(path = %path.display(), error = %first, "segment map failed, retrying");
                attempt().map_err(|e| QueueError::io(&path, e))
            }
        }
    }

    fn unmap_locked(&self, slot: &mut Slot) -> Result<()> {
        if let Some(map) = slot.map.take() {
            let result = map.flush();
            drop(map);
            self.metrics.mapped.dec();
            self.metrics.swapped_out.inc();
            self.release();
            result.map_err(|e| QueueError::io(self.path_of(slot.segment_id), e))?;
        }
        Ok(())
    }

    /// Flush and unmap `segment_id` if it is currently mapped
    pub fn unmap(&self, segment_id: u64) -> Result<bool> {
        let mut slot = self.slots[self.slot_index(segment_id)].lock();
        if slot.segment_id == segment_id && slot.map.is_some() {
            self.unmap_locked(&mut slot)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Ids of currently mapped segments
    pub fn mapped_ids(&self) -> Vec<u64> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let slot = slot.lock();
                slot.map.is_some().then_some(slot.segment_id)
            })
            .collect()
    }

    /// Synchronously flush every mapped segment
    pub fn flush_all(&self) -> Result<()> {
        for slot in &self.slots {
            let slot = slot.lock();
            if let Some(map) = slot.map.as_ref() {
                map.flush()
                    .map_err(|e| QueueError::io(self.path_of(slot.segment_id), e))?;
            }
        }
        Ok(())
    }

    /// Flush and unmap everything; later calls fail with `Closed`
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let mut first_err = None;
        for slot in &self.slots {
            let mut slot = slot.lock();
            if let Err(e) = self.unmap_locked(&mut slot) {
                first_err.get_or_insert(e);
            }
        }
        {
            let _guard = self.room.lock();
            self.room_freed.notify_all();
        }
        first_err.map_or(Ok(()), Err)
    }
}
