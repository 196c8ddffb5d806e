//! Whole pipes: receiver and fetcher front ends through to a forwarder

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use satellite_filter::{Chain, MetadataFilter, MetadataFilterConfig};
use satellite_forwarder::{ForwardResult, Forwarder};
use satellite_pipeline::{
    Acknowledger, Fetcher, Gatherer, GathererSource, NativeReceiver, NativeReceiverConfig, Pipe,
    Processor, Result, Sender, SenderSettings,
};
use satellite_protocol::{Event, EventType, Frame, FrameKind, Offset, read_frame, write_frame};
use satellite_queue::{MemoryQueueConfig, MmapQueueConfig, Queue, QueueError};
use satellite_server::{NativeServer, NativeServerConfig};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Collect {
    events: Mutex<Vec<Event>>,
}

impl Collect {
    fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.name.clone()).collect()
    }

    async fn wait_for(&self, n: usize) {
        timeout(Duration::from_secs(5), async {
            while self.events.lock().len() < n {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("events never arrived");
    }
}

struct TypedCollector {
    event_type: EventType,
    sink: Arc<Collect>,
}

#[async_trait]
impl Forwarder for TypedCollector {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn forward_type(&self) -> EventType {
        self.event_type
    }

    async fn forward(&self, events: &[Event]) -> ForwardResult<()> {
        self.sink.events.lock().extend_from_slice(events);
        Ok(())
    }

    fn supports_sync(&self) -> bool {
        true
    }

    async fn sync_forward(&self, event: &Event) -> ForwardResult<Event> {
        Ok(Event::new("answer", event.event_type, event.payload.clone()))
    }
}

fn fast_settings() -> SenderSettings {
    SenderSettings {
        max_buffer_size: 100,
        min_flush_events: 1,
        flush_time: Duration::from_millis(50),
        input_buffer: 100,
    }
}

/// Passes acks through to the queue and remembers them
struct RecordingAcker {
    queue: Arc<Queue>,
    acked: Mutex<Vec<Offset>>,
}

impl Acknowledger for RecordingAcker {
    fn ack(&self, offset: &Offset) -> satellite_queue::Result<()> {
        self.acked.lock().push(*offset);
        self.queue.ack(offset)
    }
}

/// Yields its events on the first poll only
struct OnceFetcher {
    events: Vec<Event>,
    done: AtomicBool,
}

#[async_trait]
impl Fetcher for OnceFetcher {
    fn name(&self) -> &'static str {
        "once"
    }

    async fn fetch(&self) -> Result<Vec<Event>> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self.events.clone())
    }
}

// ============================================================================
// Receiver pipe
// ============================================================================

#[tokio::test]
async fn test_receiver_pipe_end_to_end() {
    let queue = Arc::new(
        Queue::memory("trace", &MemoryQueueConfig { partition: 2, event_buffer_size: 100 }, None).unwrap(),
    );
    let collected = Arc::new(Collect::default());
    let forwarder = Arc::new(TypedCollector {
        event_type: EventType::Segment,
        sink: collected.clone(),
    });
    let sync_forwarder = Arc::new(TypedCollector {
        event_type: EventType::ConfigSync,
        sink: Arc::new(Collect::default()),
    });
    let sender = Arc::new(
        Sender::new("trace", queue.partition_count(), fast_settings(), queue.clone())
            .with_forwarder(forwarder, None)
            .with_forwarder(sync_forwarder, None),
    );
    let chain = Chain::new(vec![Box::new(
        MetadataFilter::new(MetadataFilterConfig::new("local").with_remote(false)).unwrap(),
    )]);
    let processor = Arc::new(Processor::new("trace", chain, sender.clone()));

    let server = Arc::new(NativeServer::new("native-server", NativeServerConfig::new("127.0.0.1:0")).unwrap());
    let config = NativeReceiverConfig {
        event_types: vec![EventType::Segment, EventType::ConfigSync],
    };
    let receiver = Arc::new(NativeReceiver::new("trace", config, queue.clone()).with_sync(processor.clone()));
    receiver.register(&server).unwrap();
    let gatherer = Arc::new(
        Gatherer::new("trace", queue, GathererSource::Receiver(receiver), 100)
            .with_backoff(Duration::from_millis(10)),
    );

    let cancel = CancellationToken::new();
    let addr = server.bind().await.unwrap();
    let serving = tokio::spawn(server.clone().serve(cancel.clone()));
    let pipe = tokio::spawn(Pipe::new(gatherer, processor, sender).run(cancel.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buf = BytesMut::new();
    let events: Vec<Event> = (0..10)
        .map(|i| Event::new(format!("s{i}"), EventType::Segment, "span"))
        .collect();
    write_frame(&mut stream, &Frame::data(&events).unwrap()).await.unwrap();
    let reply = read_frame(&mut stream, &mut buf).await.unwrap().unwrap();
    assert_eq!(reply.kind, FrameKind::Ack);

    let request = Event::new("discovery", EventType::ConfigSync, "uuid");
    write_frame(&mut stream, &Frame::sync_request(&request).unwrap()).await.unwrap();
    let reply = read_frame(&mut stream, &mut buf).await.unwrap().unwrap();
    assert_eq!(reply.kind, FrameKind::SyncResponse);
    assert_eq!(reply.event().unwrap().name, "answer");

    collected.wait_for(10).await;
    let mut names = collected.names();
    names.sort();
    let mut expected: Vec<String> = (0..10).map(|i| format!("s{i}")).collect();
    expected.sort();
    // local copies added by the filter are never forwarded
    assert_eq!(names, expected);

    cancel.cancel();
    pipe.await.unwrap().unwrap();
    serving.await.unwrap().unwrap();
}

// ============================================================================
// Fetcher pipe
// ============================================================================

#[tokio::test]
async fn test_fetcher_pipe_acks_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = MmapQueueConfig::default()
        .with_segment_size(4096)
        .with_capacity_segments(8)
        .with_max_in_mem_segments(3)
        .with_queue_dir(dir.path());
    let queue = Arc::new(Queue::mmap("meter", &config, None).unwrap());

    let collected = Arc::new(Collect::default());
    let sender = Arc::new(
        Sender::new("meter", 1, fast_settings(), queue.clone()).with_forwarder(
            Arc::new(TypedCollector {
                event_type: EventType::Meter,
                sink: collected.clone(),
            }),
            None,
        ),
    );
    let processor = Arc::new(Processor::new("meter", Chain::empty(), sender.clone()));
    let fetcher = Arc::new(OnceFetcher {
        events: (0..5)
            .map(|i| Event::new(format!("m{i}"), EventType::Meter, vec![i as u8; 64]))
            .collect(),
        done: AtomicBool::new(false),
    });
    let gatherer = Arc::new(
        Gatherer::new(
            "meter",
            queue,
            GathererSource::Fetcher {
                fetcher,
                interval: Duration::from_millis(20),
            },
            10,
        )
        .with_backoff(Duration::from_millis(10)),
    );

    let cancel = CancellationToken::new();
    let pipe = tokio::spawn(Pipe::new(gatherer, processor, sender).run(cancel.clone()));

    collected.wait_for(5).await;
    assert_eq!(collected.names(), ["m0", "m1", "m2", "m3", "m4"]);

    // let the ack land before shutting down
    sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    pipe.await.unwrap().unwrap();

    let reopened = Queue::mmap("meter", &config, None).unwrap();
    assert!(matches!(
        reopened.partition(0).unwrap().dequeue(),
        Err(QueueError::Empty)
    ));
    reopened.close().unwrap();
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_memory_pipe_delivers_accepted_events_on_cancel() {
    let queue = Arc::new(
        Queue::memory("trace", &MemoryQueueConfig { partition: 2, event_buffer_size: 100 }, None).unwrap(),
    );
    for i in 0..50 {
        queue
            .enqueue(&Event::new(format!("s{i:02}"), EventType::Segment, "span"))
            .unwrap();
    }

    let collected = Arc::new(Collect::default());
    let acker = Arc::new(RecordingAcker {
        queue: queue.clone(),
        acked: Mutex::new(Vec::new()),
    });
    let settings = SenderSettings {
        max_buffer_size: 8,
        min_flush_events: 1,
        flush_time: Duration::from_secs(60),
        input_buffer: 2,
    };
    let sender = Arc::new(
        Sender::new("trace", queue.partition_count(), settings, acker.clone()).with_forwarder(
            Arc::new(TypedCollector {
                event_type: EventType::Segment,
                sink: collected.clone(),
            }),
            None,
        ),
    );
    let processor = Arc::new(Processor::new("trace", Chain::empty(), sender.clone()));
    let fetcher = Arc::new(OnceFetcher {
        events: Vec::new(),
        done: AtomicBool::new(false),
    });
    let gatherer = Arc::new(
        Gatherer::new(
            "trace",
            queue,
            GathererSource::Fetcher {
                fetcher,
                interval: Duration::from_secs(60),
            },
            2,
        )
        .with_backoff(Duration::from_millis(10)),
    );

    // Cancelled before any stage got to run
    let cancel = CancellationToken::new();
    cancel.cancel();
    timeout(Duration::from_secs(5), Pipe::new(gatherer, processor, sender).run(cancel))
        .await
        .expect("pipe never stopped")
        .unwrap();

    let mut names = collected.names();
    names.sort();
    let expected: Vec<String> = (0..50).map(|i| format!("s{i:02}")).collect();
    assert_eq!(names, expected);

    // 25 events per partition in batches of 8
    let acked = acker.acked.lock().clone();
    for partition in 0..2 {
        assert_eq!(acked.iter().filter(|o| o.partition == partition).count(), 4);
    }
}
