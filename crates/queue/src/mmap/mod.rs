//! Memory-mapped durable partition
//!
//! Each partition is a ring of fixed-size segment files plus a one-page
//! meta file. Records are `u64 length (LE) | payload`; the length prefix
//! never straddles a segment boundary, payloads may.
//!
//! # Durability
//!
//! Writes land in the mapping immediately. A flush (periodic, or when
//! `flush_ceiling` records accumulate, or on close) msyncs every mapped
//! segment, copies the writing offset into the watermark, then msyncs the
//! meta page. On open, writing restarts at the watermark and reading at the
//! committed offset, so records written after the last flush may be lost on
//! a crash but a torn record is never returned.
//!
//! # Capacity
//!
//! Fullness is measured from the committed segment, not the reading one:
//! records that were read but not yet acknowledged keep their space so they
//! can be replayed after a restart. A write is refused when the largest
//! allowed record could reach the committed segment from the writing one.
//!
//! # Memory
//!
//! At most `max_in_mem_segments` segments are mapped. A mapper at the cap
//! blocks until the maintenance thread unmaps a segment neither cursor is on.

mod meta;
mod segment;
mod swapper;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use satellite_protocol::{Event, Offset, Position, SequenceEvent};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

pub use meta::{Cursor, META_FILE, META_VERSION, Meta, PAGE_SIZE};
pub use segment::segment_file_name;

use crate::error::{QueueError, Result};
use crate::metrics::QueueMetrics;
use crate::Partition;
use segment::SegmentRing;
use swapper::Command;

/// Record length prefix size
pub const RECORD_HEADER_SIZE: u64 = 8;

/// Configuration for the `mmap-queue` plugin
///
/// ```yaml
/// queue:
///   plugin_name: mmap-queue
///   partition: 2
///   segment_size: 262144
///   max_in_mem_segments: 10
///   queue_capacity_segments: 2000
///   flush_period: 1000
///   flush_ceiling: 10000
///   max_event_size: 20480
///   queue_dir: satellite-mmap-queue
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MmapQueueConfig {
    /// Number of partitions
    /// Default: 1
    pub partition: usize,

    /// Segment file size, rounded up to a page multiple
    /// Default: 262144 (256KB)
    pub segment_size: u64,

    /// Cap on simultaneously mapped segments
    /// Default: 10
    pub max_in_mem_segments: usize,

    /// Ring length in segments
    /// Default: 2000
    pub queue_capacity_segments: u64,

    /// Background flush period
    /// Default: 1s
    #[serde(with = "satellite_config::duration")]
    pub flush_period: Duration,

    /// Unflushed records that force a flush
    /// Default: 10000
    pub flush_ceiling: u64,

    /// Largest encoded event accepted
    /// Default: 20480 (20KB)
    pub max_event_size: usize,

    /// Base directory; partitions live in `<queue_dir>/<pipe>/partition-<i>`
    /// Default: satellite-mmap-queue
    pub queue_dir: PathBuf,
}

impl Default for MmapQueueConfig {
    fn default() -> Self {
        Self {
            partition: 1,
            segment_size: 256 * 1024,
            max_in_mem_segments: 10,
            queue_capacity_segments: 2000,
            flush_period: Duration::from_secs(1),
            flush_ceiling: 10_000,
            max_event_size: 20 * 1024,
            queue_dir: PathBuf::from("satellite-mmap-queue"),
        }
    }
}

impl MmapQueueConfig {
    #[must_use]
    pub fn with_partitions(mut self, partition: usize) -> Self {
        self.partition = partition;
        self
    }

    #[must_use]
    pub fn with_segment_size(mut self, segment_size: u64) -> Self {
        self.segment_size = segment_size;
        self
    }

    #[must_use]
    pub fn with_capacity_segments(mut self, capacity: u64) -> Self {
        self.queue_capacity_segments = capacity;
        self
    }

    #[must_use]
    pub fn with_max_in_mem_segments(mut self, max: usize) -> Self {
        self.max_in_mem_segments = max;
        self
    }

    #[must_use]
    pub fn with_max_event_size(mut self, max: usize) -> Self {
        self.max_event_size = max;
        self
    }

    #[must_use]
    pub fn with_flush_period(mut self, period: Duration) -> Self {
        self.flush_period = period;
        self
    }

    #[must_use]
    pub fn with_flush_ceiling(mut self, ceiling: u64) -> Self {
        self.flush_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_queue_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.queue_dir = dir.into();
        self
    }

    /// Segment size rounded up to a page multiple, floor one page
    pub fn effective_segment_size(&self) -> u64 {
        self.segment_size.max(PAGE_SIZE).div_ceil(PAGE_SIZE) * PAGE_SIZE
    }

    /// Segments one maximum-size record can reach beyond its start segment
    ///
    /// A record starts at least `RECORD_HEADER_SIZE` bytes before the end of
    /// its segment, so the header never adds a segment of its own.
    pub fn span_segments(&self) -> u64 {
        (self.max_event_size as u64).div_ceil(self.effective_segment_size())
    }

    /// Mapping cap, clamped to the ring length
    pub fn effective_max_in_mem(&self) -> usize {
        self.max_in_mem_segments
            .min(self.queue_capacity_segments as usize)
    }

    /// Check limits
    pub fn validate(&self) -> Result<()> {
        if self.partition == 0 {
            return Err(QueueError::InvalidConfig("partition must be at least 1".into()));
        }
        if self.max_event_size == 0 {
            return Err(QueueError::InvalidConfig(
                "max_event_size must be greater than zero".into(),
            ));
        }
        let cap = self.queue_capacity_segments;
        if self.span_segments() >= cap {
            return Err(QueueError::InvalidConfig(format!(
                "max_event_size {} exceeds {} bytes ({} segments of {} bytes minus one)",
                self.max_event_size,
                self.effective_segment_size() * cap.saturating_sub(1),
                cap,
                self.effective_segment_size()
            )));
        }
        if self.flush_period.is_zero() {
            return Err(QueueError::InvalidConfig("flush_period must be greater than zero".into()));
        }
        let max_mapped = self.effective_max_in_mem();
        if max_mapped < 3 && (max_mapped as u64) < cap {
            return Err(QueueError::InvalidConfig(format!(
                "max_in_mem_segments must be at least 3 (got {})",
                self.max_in_mem_segments
            )));
        }
        Ok(())
    }

    /// Directory of one partition
    pub fn partition_dir(&self, pipe: &str, index: usize) -> PathBuf {
        self.queue_dir.join(pipe).join(format!("partition-{index}"))
    }
}

/// State shared between the partition handle and its maintenance thread
pub(crate) struct Shared {
    index: usize,
    segment_size: u64,
    capacity: u64,
    span: u64,
    max_event_size: usize,
    flush_ceiling: u64,
    meta: Meta,
    ring: SegmentRing,
    writer: Mutex<()>,
    reader: Mutex<Position>,
    committed: Mutex<Position>,
    writing_seg: AtomicU64,
    reading_seg: AtomicU64,
    committed_seg: AtomicU64,
    unflushed: AtomicU64,
    closed: AtomicBool,
    commands: Mutex<Option<Sender<Command>>>,
    metrics: QueueMetrics,
}

impl Shared {
    #[inline]
    fn writing_segment(&self) -> u64 {
        self.writing_seg.load(Ordering::Acquire)
    }

    #[inline]
    fn reading_segment(&self) -> u64 {
        self.reading_seg.load(Ordering::Acquire)
    }

    fn signal(&self, command: Command) {
        if let Some(tx) = self.commands.lock().as_ref() {
            let _ = tx.send(command);
        }
    }

    /// Skip to the next segment if a length prefix no longer fits
    #[inline]
    fn normalize(&self, pos: Position) -> Position {
        if self.segment_size - pos.byte_offset < RECORD_HEADER_SIZE {
            Position::new(pos.segment_id + 1, 0)
        } else {
            pos
        }
    }

    // Committed, not reading: unacked records must survive a replay
    fn is_full(&self) -> bool {
        let writing = self.writing_segment();
        let tail = self.committed_seg.load(Ordering::Acquire);
        writing + self.span > tail + self.capacity - 1
    }

    fn write_bytes(&self, pos: &mut Position, mut data: &[u8]) -> Result<()> {
        let pressure = || self.signal(Command::Pressure);
        while !data.is_empty() {
            let start = pos.byte_offset as usize;
            let n = data.len().min((self.segment_size - pos.byte_offset) as usize);
            let (chunk, rest) = data.split_at(n);
            self.ring.with_segment(pos.segment_id, &pressure, |bytes| {
                bytes[start..start + n].copy_from_slice(chunk);
            })?;
            data = rest;
            advance(pos, n as u64, self.segment_size);
        }
        Ok(())
    }

    fn read_bytes(&self, pos: &mut Position, out: &mut [u8]) -> Result<()> {
        let pressure = || self.signal(Command::Pressure);
        let mut filled = 0;
        while filled < out.len() {
            let start = pos.byte_offset as usize;
            let n = (out.len() - filled).min((self.segment_size - pos.byte_offset) as usize);
            let dest = &mut out[filled..filled + n];
            self.ring.with_segment(pos.segment_id, &pressure, |bytes| {
                dest.copy_from_slice(&bytes[start..start + n]);
            })?;
            filled += n;
            advance(pos, n as u64, self.segment_size);
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Bytes before the published writing offset are already in the mapping
        let snapshot = self.meta.get(Cursor::Writing);
        self.unflushed.store(0, Ordering::Relaxed);
        self.ring.flush_all()?;
        self.meta.set(Cursor::Watermark, snapshot);
        self.meta.flush()?;
        self.metrics.flushes.inc();
        Ok(())
    }
}

#[inline]
fn advance(pos: &mut Position, n: u64, segment_size: u64) {
    pos.byte_offset += n;
    if pos.byte_offset >= segment_size {
        pos.segment_id += 1;
        pos.byte_offset = 0;
    }
}

/// Durable, memory-mapped partition
pub struct MmapPartition {
    shared: Arc<Shared>,
    dir: PathBuf,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MmapPartition {
    /// Open (or create) the partition stored in `dir`
    pub fn open(
        config: &MmapQueueConfig,
        dir: &Path,
        index: usize,
        metrics: QueueMetrics,
    ) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(dir).map_err(|e| QueueError::io(dir, e))?;

        let segment_size = config.effective_segment_size();
        let capacity = config.queue_capacity_segments;
        let (meta, created) = Meta::open(dir, capacity)?;

        // Unflushed writes are discarded, unacked reads are replayed
        let watermark = meta.get(Cursor::Watermark);
        let committed = meta.get(Cursor::Committed).min(watermark);
        meta.set(Cursor::Writing, watermark);
        meta.set(Cursor::Committed, committed);
        meta.set(Cursor::Reading, committed);
        meta.flush()?;

        let ring = SegmentRing::create(
            dir,
            segment_size,
            capacity,
            config.effective_max_in_mem(),
            metrics.clone(),
        )?;

        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            index,
            segment_size,
            capacity,
            span: config.span_segments(),
            max_event_size: config.max_event_size,
            flush_ceiling: config.flush_ceiling.max(1),
            meta,
            ring,
            writer: Mutex::new(()),
            reader: Mutex::new(committed),
            committed: Mutex::new(committed),
            writing_seg: AtomicU64::new(watermark.segment_id),
            reading_seg: AtomicU64::new(committed.segment_id),
            committed_seg: AtomicU64::new(committed.segment_id),
            unflushed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            commands: Mutex::new(Some(tx)),
            metrics,
        });

        let worker = swapper::spawn(
            format!("mmap-queue-{index}"),
            Arc::clone(&shared),
            rx,
            config.flush_period,
        )
        .map_err(|e| QueueError::io(dir, e))?;

        if created {
            info!(partition = index, dir = %dir.display(), "created mmap queue partition");
        } else {
            info!(
                partition = index,
                dir = %dir.display(),
                writing = %watermark,
                reading = %committed,
                "recovered mmap queue partition"
            );
        }

        Ok(Self {
            shared,
            dir: dir.to_path_buf(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Directory holding this partition's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current value of one persisted cursor
    pub fn cursor(&self, cursor: Cursor) -> Position {
        self.shared.meta.get(cursor)
    }

    /// Number of mapped segments
    pub fn mapped_segments(&self) -> usize {
        self.shared.ring.mapped_count()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

impl Partition for MmapPartition {
    fn index(&self) -> usize {
        self.shared.index
    }

    fn enqueue(&self, event: &Event) -> Result<()> {
        self.ensure_open()?;
        let shared = &self.shared;

        let mut record = BytesMut::with_capacity(RECORD_HEADER_SIZE as usize + event.encoded_len());
        record.extend_from_slice(&(event.encoded_len() as u64).to_le_bytes());
        event.encode_to(&mut record)?;
        let size = record.len() - RECORD_HEADER_SIZE as usize;
        if size > shared.max_event_size {
            shared.metrics.too_large.inc();
            return Err(QueueError::EventTooLarge {
                size,
                max: shared.max_event_size,
            });
        }

        let _writer = shared.writer.lock();
        if shared.is_full() {
            shared.metrics.full.inc();
            return Err(QueueError::Full);
        }

        let mut pos = shared.normalize(shared.meta.get(Cursor::Writing));
        shared.write_bytes(&mut pos, &record)?;
        let pos = shared.normalize(pos);

        // Publish only after every byte is in place
        shared.meta.set(Cursor::Writing, pos);
        shared.writing_seg.store(pos.segment_id, Ordering::Release);
        shared.metrics.enqueued.inc();

        if shared.unflushed.fetch_add(1, Ordering::Relaxed) + 1 >= shared.flush_ceiling {
            shared.unflushed.store(0, Ordering::Relaxed);
            shared.signal(Command::Flush);
        }
        Ok(())
    }

    fn dequeue(&self) -> Result<SequenceEvent> {
        self.ensure_open()?;
        let shared = &self.shared;

        let mut reader = shared.reader.lock();
        let start = shared.normalize(*reader);
        let writing = shared.meta.get(Cursor::Writing);
        if start >= writing {
            return Err(QueueError::Empty);
        }

        let mut pos = start;
        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        shared.read_bytes(&mut pos, &mut header)?;
        let len = u64::from_le_bytes(header);
        if len == 0 || len > shared.max_event_size as u64 {
            return Err(QueueError::corrupted(
                start,
                format!("record length {len} outside 1..={}", shared.max_event_size),
            ));
        }

        let mut payload = vec![0u8; len as usize];
        shared.read_bytes(&mut pos, &mut payload)?;
        let pos = shared.normalize(pos);
        if pos > writing {
            return Err(QueueError::corrupted(
                start,
                format!("record ends at {pos}, past writing offset {writing}"),
            ));
        }

        for abandoned in start.segment_id..pos.segment_id {
            shared.signal(Command::Abandoned(abandoned));
        }
        *reader = pos;
        shared.meta.set(Cursor::Reading, pos);
        shared.reading_seg.store(pos.segment_id, Ordering::Release);
        shared.metrics.dequeued.inc();
        drop(reader);

        let event = Event::decode(payload.into()).inspect_err(|e| {
            warn!(partition = shared.index, offset = %start, error = %e, "skipping undecodable record");
        })?;
        Ok(SequenceEvent::new(event, Offset::durable(shared.index, pos)))
    }

    fn ack(&self, offset: &Offset) -> Result<()> {
        self.ensure_open()?;
        let Some(pos) = offset.position else {
            return Ok(());
        };
        let shared = &self.shared;
        let reading = *shared.reader.lock();
        if pos > reading {
            return Err(QueueError::corrupted(
                pos,
                format!("ack beyond read offset {reading}"),
            ));
        }

        let mut committed = shared.committed.lock();
        if pos > *committed {
            *committed = pos;
            shared.meta.set(Cursor::Committed, pos);
            shared.committed_seg.store(pos.segment_id, Ordering::Release);
            shared.metrics.acked.inc();
        }
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.shared.is_full()
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.flush()
    }

    fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shared.signal(Command::Close);
        self.shared.commands.lock().take();
        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            error!(partition = self.shared.index, "queue maintenance thread panicked");
        }

        let flushed = self.shared.flush();
        let unmapped = self.shared.ring.close();
        debug!(partition = self.shared.index, "mmap queue partition closed");
        flushed.and(unmapped)
    }
}

impl Drop for MmapPartition {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(partition = self.shared.index, error = %e, "failed to close mmap queue partition");
        }
    }
}

#[cfg(test)]
#[path = "mmap_test.rs"]
mod tests;
