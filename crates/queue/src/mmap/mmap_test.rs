//! Mmap partition tests

use std::time::Duration;

use satellite_protocol::{Event, EventType, Offset, Position};
use tempfile::TempDir;

use super::*;
use crate::{Partition, QueueError};

fn small_config() -> MmapQueueConfig {
    MmapQueueConfig::default()
        .with_segment_size(4096)
        .with_capacity_segments(8)
        .with_max_in_mem_segments(3)
        .with_max_event_size(4096)
        .with_flush_period(Duration::from_secs(3600))
}

fn event(i: usize, size: usize) -> Event {
    Event::new(format!("e{i}"), EventType::Log, vec![(i % 251) as u8; size])
}

fn open(config: &MmapQueueConfig, dir: &TempDir) -> MmapPartition {
    MmapPartition::open(config, dir.path(), 0, QueueMetrics::detached()).unwrap()
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_segment_size_rounded_to_page() {
    let config = MmapQueueConfig::default().with_segment_size(5000);
    assert_eq!(config.effective_segment_size(), 8192);

    let config = MmapQueueConfig::default().with_segment_size(100);
    assert_eq!(config.effective_segment_size(), 4096);
}

#[test]
fn test_span_segments() {
    let config = small_config();
    // A header starts at most 4088 bytes in, so 4096 + 8 bytes reach one more segment
    assert_eq!(config.span_segments(), 1);

    let config = small_config().with_max_event_size(4097);
    assert_eq!(config.span_segments(), 2);
}

#[test]
fn test_validate_rejects_event_larger_than_ring() {
    let config = small_config().with_capacity_segments(2).with_max_event_size(4097);
    assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));
}

#[test]
fn test_validate_accepts_event_of_all_but_one_segment() {
    let config = small_config().with_capacity_segments(3).with_max_event_size(2 * 4096);
    config.validate().unwrap();

    let config = small_config().with_capacity_segments(2);
    config.validate().unwrap();
}

#[test]
fn test_largest_event_cycles_through_two_segment_ring() {
    let dir = TempDir::new().unwrap();
    let config = small_config()
        .with_capacity_segments(2)
        .with_max_in_mem_segments(2);
    let partition = open(&config, &dir);

    let overhead = Event::new("e0", EventType::Log, Vec::new()).encoded_len();
    for round in 0..6 {
        let largest = Event::new("e0", EventType::Log, vec![round as u8; 4096 - overhead]);
        assert_eq!(largest.encoded_len(), 4096);
        partition.enqueue(&largest).unwrap();

        // The unacked record still owns the committed segment
        assert!(partition.is_full());
        assert!(matches!(partition.enqueue(&largest), Err(QueueError::Full)));

        let seq = partition.dequeue().unwrap();
        assert_eq!(seq.event.payload.as_ref(), vec![round as u8; 4096 - overhead].as_slice());
        partition.ack(&seq.offset).unwrap();
    }
    assert!(matches!(partition.dequeue(), Err(QueueError::Empty)));
}

#[test]
fn test_validate_rejects_tiny_mapping_cap() {
    let config = small_config().with_max_in_mem_segments(2);
    assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));

    // A cap covering the whole ring is always fine
    let config = small_config()
        .with_capacity_segments(2)
        .with_max_event_size(1000)
        .with_max_in_mem_segments(2);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
partition: 3
segment_size: 8192
flush_period: 250ms
queue_dir: /tmp/q
"#;
    let config: MmapQueueConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.partition, 3);
    assert_eq!(config.segment_size, 8192);
    assert_eq!(config.flush_period, Duration::from_millis(250));
    assert_eq!(config.flush_ceiling, 10_000);
    assert_eq!(config.partition_dir("trace", 1), PathBuf::from("/tmp/q/trace/partition-1"));
}

// ============================================================================
// Enqueue / Dequeue
// ============================================================================

#[test]
fn test_fifo_round_trip() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);

    for i in 0..20 {
        partition.enqueue(&event(i, 300)).unwrap();
    }
    for i in 0..20 {
        let seq = partition.dequeue().unwrap();
        assert_eq!(seq.event.name, format!("e{i}"));
        assert_eq!(seq.event.payload.len(), 300);
        assert_eq!(seq.offset.partition, 0);
    }
    assert!(matches!(partition.dequeue(), Err(QueueError::Empty)));
}

#[test]
fn test_record_spans_segments() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);

    // Each record is roughly 3KB, so the second one straddles a boundary
    for i in 0..4 {
        partition.enqueue(&event(i, 3000)).unwrap();
    }
    for i in 0..4 {
        let seq = partition.dequeue().unwrap();
        assert_eq!(seq.event.payload.as_ref(), vec![(i % 251) as u8; 3000].as_slice());
    }
}

#[test]
fn test_header_never_straddles() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);

    let first = event(0, 10);
    // Size the filler so only 4 bytes remain in segment 0
    let filler_len = 4096 - 4 - 2 * RECORD_HEADER_SIZE as usize - first.encoded_len();
    let overhead = Event::new("f", EventType::Log, Vec::new()).encoded_len();
    let filler = Event::new("f", EventType::Log, vec![7u8; filler_len - overhead]);
    assert_eq!(filler.encoded_len(), filler_len);

    partition.enqueue(&first).unwrap();
    partition.enqueue(&filler).unwrap();
    assert_eq!(partition.cursor(Cursor::Writing), Position::new(1, 0));

    partition.enqueue(&event(2, 10)).unwrap();
    assert_eq!(partition.dequeue().unwrap().event.name, "e0");
    assert_eq!(partition.dequeue().unwrap().event.name, "f");
    let third = partition.dequeue().unwrap();
    assert_eq!(third.event.name, "e2");
    assert_eq!(third.offset.position.unwrap().segment_id, 1);
}

#[test]
fn test_event_too_large_leaves_writing_unchanged() {
    let dir = TempDir::new().unwrap();
    let config = small_config().with_max_event_size(1024);
    let partition = open(&config, &dir);

    let before = partition.cursor(Cursor::Writing);
    let err = partition.enqueue(&event(0, 2048)).unwrap_err();
    assert!(matches!(err, QueueError::EventTooLarge { max: 1024, .. }));
    assert_eq!(partition.cursor(Cursor::Writing), before);
}

#[test]
fn test_dequeue_offset_points_past_record() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);

    partition.enqueue(&event(0, 100)).unwrap();
    let seq = partition.dequeue().unwrap();
    assert_eq!(seq.offset.position, Some(partition.cursor(Cursor::Writing)));
}

// ============================================================================
// Ack
// ============================================================================

#[test]
fn test_ack_is_monotonic() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);

    partition.enqueue(&event(0, 100)).unwrap();
    partition.enqueue(&event(1, 100)).unwrap();
    let first = partition.dequeue().unwrap().offset;
    let second = partition.dequeue().unwrap().offset;

    partition.ack(&second).unwrap();
    partition.ack(&first).unwrap();
    assert_eq!(Some(partition.cursor(Cursor::Committed)), second.position);
}

#[test]
fn test_ack_beyond_reading_rejected() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);

    partition.enqueue(&event(0, 100)).unwrap();
    let ahead = Offset::durable(0, Position::new(3, 0));
    assert!(matches!(partition.ack(&ahead), Err(QueueError::Corrupted { .. })));
}

#[test]
fn test_volatile_ack_ignored() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);
    partition.ack(&Offset::volatile(0)).unwrap();
    assert_eq!(partition.cursor(Cursor::Committed), Position::default());
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn test_full_until_acked() {
    let dir = TempDir::new().unwrap();
    let config = small_config().with_capacity_segments(5);
    let partition = open(&config, &dir);

    let mut written = 0;
    loop {
        match partition.enqueue(&event(written, 2000)) {
            Ok(()) => written += 1,
            Err(QueueError::Full) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert!(written < 100, "ring never filled");
    }
    assert!(partition.is_full());
    assert_eq!(partition.cursor(Cursor::Reading), Position::default());

    // Consume and ack everything; the ring frees up
    let mut last = None;
    for _ in 0..written {
        last = Some(partition.dequeue().unwrap().offset);
    }
    partition.ack(&last.unwrap()).unwrap();
    assert!(!partition.is_full());
    partition.enqueue(&event(0, 2000)).unwrap();
}

#[test]
fn test_mapping_cap_respected() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);

    for round in 0..5 {
        for i in 0..6 {
            partition.enqueue(&event(round * 10 + i, 2000)).unwrap();
        }
        let mut last = None;
        for _ in 0..6 {
            last = Some(partition.dequeue().unwrap().offset);
        }
        partition.ack(&last.unwrap()).unwrap();
        assert!(partition.mapped_segments() <= 3);
    }
}

// ============================================================================
// Durability
// ============================================================================

#[test]
fn test_flush_sets_watermark() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);

    partition.enqueue(&event(0, 100)).unwrap();
    assert_eq!(partition.cursor(Cursor::Watermark), Position::default());
    partition.flush().unwrap();
    assert_eq!(
        partition.cursor(Cursor::Watermark),
        partition.cursor(Cursor::Writing)
    );
}

#[test]
fn test_flush_ceiling_triggers_background_flush() {
    let dir = TempDir::new().unwrap();
    let config = small_config().with_flush_ceiling(5);
    let partition = open(&config, &dir);

    for i in 0..5 {
        partition.enqueue(&event(i, 50)).unwrap();
    }
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while partition.cursor(Cursor::Watermark) != partition.cursor(Cursor::Writing) {
        assert!(std::time::Instant::now() < deadline, "ceiling flush never ran");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_clean_close_then_reopen_replays_unacked() {
    let dir = TempDir::new().unwrap();
    let config = small_config();
    {
        let partition = open(&config, &dir);
        for i in 0..6 {
            partition.enqueue(&event(i, 100)).unwrap();
        }
        let mut acked = None;
        for _ in 0..3 {
            acked = Some(partition.dequeue().unwrap().offset);
        }
        partition.ack(&acked.unwrap()).unwrap();
        // Read but never acked
        partition.dequeue().unwrap();
        partition.close().unwrap();
    }

    let partition = open(&config, &dir);
    for i in 3..6 {
        assert_eq!(partition.dequeue().unwrap().event.name, format!("e{i}"));
    }
    assert!(matches!(partition.dequeue(), Err(QueueError::Empty)));
}

#[test]
fn test_closed_partition_rejects() {
    let dir = TempDir::new().unwrap();
    let partition = open(&small_config(), &dir);
    partition.close().unwrap();
    assert!(matches!(partition.enqueue(&event(0, 10)), Err(QueueError::Closed)));
    assert!(matches!(partition.dequeue(), Err(QueueError::Closed)));
    // Idempotent
    partition.close().unwrap();
}

#[test]
fn test_capacity_change_fails_open() {
    let dir = TempDir::new().unwrap();
    open(&small_config(), &dir).close().unwrap();

    let config = small_config().with_capacity_segments(16);
    let err = MmapPartition::open(&config, dir.path(), 0, QueueMetrics::detached())
        .err()
        .unwrap();
    assert!(matches!(err, QueueError::MetaMismatch { field: "capacity", .. }));
}
