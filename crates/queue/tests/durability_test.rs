//! Durable queue end-to-end scenarios

use std::time::Duration;

use satellite_protocol::{Event, EventType};
use satellite_queue::mmap::Cursor;
use satellite_queue::{MmapPartition, MmapQueueConfig, Partition, Queue, QueueError, QueueMetrics};
use tempfile::TempDir;

fn payload(i: usize, len: usize) -> Vec<u8> {
    (0..len).map(|j| ((i * 31 + j) % 256) as u8).collect()
}

fn event(i: usize, len: usize) -> Event {
    Event::new(format!("event-{i}"), EventType::Segment, payload(i, len))
}

fn config(dir: &TempDir) -> MmapQueueConfig {
    MmapQueueConfig::default()
        .with_queue_dir(dir.path())
        .with_segment_size(16 * 1024)
        .with_capacity_segments(16)
        .with_max_in_mem_segments(4)
        .with_max_event_size(8 * 1024)
        .with_flush_period(Duration::from_secs(3600))
}

fn open_partition(config: &MmapQueueConfig) -> MmapPartition {
    let dir = config.partition_dir("durability", 0);
    MmapPartition::open(config, &dir, 0, QueueMetrics::detached()).unwrap()
}

#[test]
fn test_round_trip_then_ack_all() {
    let dir = TempDir::new().unwrap();
    let partition = open_partition(&config(&dir));

    for i in 0..10 {
        partition.enqueue(&event(i, 2048)).unwrap();
    }
    let mut last = None;
    for i in 0..10 {
        let seq = partition.dequeue().unwrap();
        assert_eq!(seq.event.name, format!("event-{i}"));
        assert_eq!(seq.event.payload.as_ref(), payload(i, 2048).as_slice());
        partition.ack(&seq.offset).unwrap();
        last = Some(seq.offset);
    }

    let committed = partition.cursor(Cursor::Committed);
    assert_eq!(Some(committed), last.unwrap().position);
    assert_eq!(committed, partition.cursor(Cursor::Writing));
}

#[test]
fn test_oversize_rejected() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir).with_max_event_size(1024);
    let partition = open_partition(&config);

    partition.enqueue(&event(0, 100)).unwrap();
    let writing = partition.cursor(Cursor::Writing);

    let err = partition.enqueue(&event(1, 2048)).unwrap_err();
    assert!(matches!(err, QueueError::EventTooLarge { .. }));
    assert_eq!(partition.cursor(Cursor::Writing), writing);
}

#[test]
fn test_capacity_back_pressure() {
    let dir = TempDir::new().unwrap();
    let config = MmapQueueConfig::default()
        .with_queue_dir(dir.path())
        .with_segment_size(4096)
        .with_capacity_segments(5)
        .with_max_event_size(4096)
        .with_flush_period(Duration::from_secs(3600));
    let partition = open_partition(&config);
    let reading = partition.cursor(Cursor::Reading);

    let mut accepted = 0;
    let mut rejected = 0;
    for i in 0..100 {
        match partition.enqueue(&event(i, 2048)) {
            Ok(()) => {
                assert_eq!(rejected, 0, "enqueue succeeded after the ring filled");
                accepted += 1;
            }
            Err(QueueError::Full) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert!(accepted > 0);
    assert_eq!(accepted + rejected, 100);
    assert_eq!(partition.cursor(Cursor::Reading), reading);

    // Everything accepted is still intact
    for i in 0..accepted {
        let seq = partition.dequeue().unwrap();
        assert_eq!(seq.event.payload.as_ref(), payload(i, 2048).as_slice());
    }
}

#[test]
fn test_crash_recovery_keeps_flushed_records() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let partition = open_partition(&config);
    for i in 0..10 {
        partition.enqueue(&event(i, 512)).unwrap();
    }
    partition.flush().unwrap();
    for i in 10..15 {
        partition.enqueue(&event(i, 512)).unwrap();
    }
    // Simulate a kill: no close, no final flush
    std::mem::forget(partition);

    let partition = open_partition(&config);
    for i in 0..10 {
        let seq = partition.dequeue().unwrap();
        assert_eq!(seq.event.name, format!("event-{i}"));
        assert_eq!(seq.event.payload.as_ref(), payload(i, 512).as_slice());
    }
    // Unflushed tail is dropped on restart
    assert!(matches!(partition.dequeue(), Err(QueueError::Empty)));

    // And the ring keeps working after recovery
    partition.enqueue(&event(99, 64)).unwrap();
    assert_eq!(partition.dequeue().unwrap().event.name, "event-99");
}

#[test]
fn test_restart_after_clean_shutdown_reads_nothing_old() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    {
        let partition = open_partition(&config);
        for i in 0..5 {
            partition.enqueue(&event(i, 256)).unwrap();
        }
        let mut last = None;
        for _ in 0..5 {
            last = Some(partition.dequeue().unwrap().offset);
        }
        partition.ack(&last.unwrap()).unwrap();
        partition.close().unwrap();
    }

    let partition = open_partition(&config);
    assert!(matches!(partition.dequeue(), Err(QueueError::Empty)));
}

#[test]
fn test_two_partition_routing() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir).with_partitions(2);
    let queue = Queue::mmap("routing", &config, None).unwrap();
    assert!(queue.is_durable());

    for i in 0..10 {
        queue.enqueue(&event(i, 128)).unwrap();
    }

    for index in 0..2 {
        let partition = queue.partition(index).unwrap();
        let mut seen = Vec::new();
        while let Ok(seq) = partition.dequeue() {
            seen.push(seq.event.name);
        }
        let expected: Vec<String> = (0..10)
            .filter(|i| i % 2 == index)
            .map(|i| format!("event-{i}"))
            .collect();
        assert_eq!(seen, expected);
    }

    assert!(dir.path().join("routing/partition-0/meta.dat").exists());
    assert!(dir.path().join("routing/partition-1/0_segment.dat").exists());
    queue.close().unwrap();
}
