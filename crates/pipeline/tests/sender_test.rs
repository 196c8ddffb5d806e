//! Sender batching, gating, fallback and drain

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use satellite_client::ClientStatus;
use satellite_forwarder::{
    ForwardError, ForwardResult, Forwarder, TimerFallbacker, TimerFallbackerConfig,
};
use satellite_pipeline::{Acknowledger, PipelineError, Sender, SenderSettings, SyncInvoker};
use satellite_protocol::{
    Event, EventType, Offset, OutputContext, Position, SequenceEvent, StatusCode,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Records every batch it is handed; optionally always fails
#[derive(Default)]
struct RecordingForwarder {
    batches: Mutex<Vec<Vec<String>>>,
    fail: bool,
}

impl RecordingForwarder {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }

    fn names(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn forward_type(&self) -> EventType {
        EventType::Segment
    }

    async fn forward(&self, events: &[Event]) -> ForwardResult<()> {
        self.batches
            .lock()
            .push(events.iter().map(|e| e.name.clone()).collect());
        if self.fail {
            return Err(ForwardError::upstream(StatusCode::Unavailable, "down"));
        }
        Ok(())
    }

    fn supports_sync(&self) -> bool {
        true
    }

    async fn sync_forward(&self, event: &Event) -> ForwardResult<Event> {
        Ok(Event::new(format!("{}-reply", event.name), event.event_type, event.payload.clone()))
    }
}

#[derive(Default)]
struct RecordingAcker(Mutex<Vec<Offset>>);

impl Acknowledger for RecordingAcker {
    fn ack(&self, offset: &Offset) -> satellite_queue::Result<()> {
        self.0.lock().push(*offset);
        Ok(())
    }
}

fn offset(i: u64) -> Offset {
    Offset::durable(0, Position::new(0, i * 100))
}

fn context(i: u64) -> OutputContext {
    OutputContext::new(SequenceEvent::new(
        Event::new(format!("e{i}"), EventType::Segment, "span"),
        offset(i),
    ))
}

fn settings(flush_ms: u64, min_flush: usize, input_buffer: usize) -> SenderSettings {
    SenderSettings {
        max_buffer_size: 200,
        min_flush_events: min_flush,
        flush_time: Duration::from_millis(flush_ms),
        input_buffer,
    }
}

struct Harness {
    sender: Arc<Sender>,
    forwarder: Arc<RecordingForwarder>,
    acker: Arc<RecordingAcker>,
    tasks: JoinSet<satellite_pipeline::Result<()>>,
    cancel: CancellationToken,
}

fn harness(sender: Sender, forwarder: Arc<RecordingForwarder>, acker: Arc<RecordingAcker>) -> Harness {
    let sender = Arc::new(sender.with_forwarder(forwarder.clone(), None));
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    sender.start(&mut tasks, cancel.clone()).unwrap();
    Harness {
        sender,
        forwarder,
        acker,
        tasks,
        cancel,
    }
}

impl Harness {
    async fn stop(mut self) -> Self {
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            joined.unwrap().unwrap();
        }
        self
    }
}

// ============================================================================
// Flush policy
// ============================================================================

#[tokio::test]
async fn test_timer_flush_sends_one_batch() {
    let acker = Arc::new(RecordingAcker::default());
    let forwarder = Arc::new(RecordingForwarder::default());
    let h = harness(
        Sender::new("trace", 1, settings(1000, 3, 100), acker.clone()),
        forwarder,
        acker,
    );

    let input = h.sender.input_channel(0).unwrap();
    for i in 0..5 {
        input.send(context(i)).await.unwrap();
    }
    sleep(Duration::from_millis(1200)).await;

    assert_eq!(h.forwarder.batches(), [["e0", "e1", "e2", "e3", "e4"]]);
    assert_eq!(*h.acker.0.lock(), [offset(4)]);
    h.stop().await;
}

#[tokio::test]
async fn test_timer_waits_for_min_flush_events() {
    let acker = Arc::new(RecordingAcker::default());
    let forwarder = Arc::new(RecordingForwarder::default());
    let h = harness(
        Sender::new("trace", 1, settings(50, 3, 100), acker.clone()),
        forwarder,
        acker,
    );

    let input = h.sender.input_channel(0).unwrap();
    input.send(context(0)).await.unwrap();
    input.send(context(1)).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(h.forwarder.batches().is_empty());

    input.send(context(2)).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(h.forwarder.batches(), [["e0", "e1", "e2"]]);
    h.stop().await;
}

#[tokio::test]
async fn test_full_batch_flushes_immediately() {
    let acker = Arc::new(RecordingAcker::default());
    let forwarder = Arc::new(RecordingForwarder::default());
    let mut s = settings(60_000, 1, 100);
    s.max_buffer_size = 2;
    let h = harness(Sender::new("trace", 1, s, acker.clone()), forwarder, acker);

    let input = h.sender.input_channel(0).unwrap();
    for i in 0..4 {
        input.send(context(i)).await.unwrap();
    }
    timeout(Duration::from_secs(5), async {
        while h.acker.0.lock().len() < 2 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(h.forwarder.batches(), [["e0", "e1"], ["e2", "e3"]]);
    assert_eq!(*h.acker.0.lock(), [offset(1), offset(3)]);
    h.stop().await;
}

// ============================================================================
// Connection gating
// ============================================================================

#[tokio::test]
async fn test_disconnect_blocks_producers_without_loss() {
    let (status_tx, status_rx) = watch::channel(ClientStatus::Disconnect);
    let acker = Arc::new(RecordingAcker::default());
    let forwarder = Arc::new(RecordingForwarder::default());
    let h = harness(
        Sender::new("trace", 1, settings(50, 1, 2), acker.clone()).with_status(status_rx),
        forwarder,
        acker,
    );

    let input = h.sender.input_channel(0).unwrap();
    let producer = tokio::spawn(async move {
        for i in 0..6 {
            input.send(context(i)).await.unwrap();
        }
    });

    sleep(Duration::from_millis(300)).await;
    assert!(!producer.is_finished(), "producer should block while disconnected");
    assert!(h.forwarder.batches().is_empty());

    status_tx.send(ClientStatus::Connected).unwrap();
    timeout(Duration::from_secs(5), producer).await.unwrap().unwrap();
    timeout(Duration::from_secs(5), async {
        while h.forwarder.names().len() < 6 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(h.forwarder.names(), ["e0", "e1", "e2", "e3", "e4", "e5"]);
    assert_eq!(h.acker.0.lock().last(), Some(&offset(5)));
    h.stop().await;
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_failed_batch_is_retried_then_acked() {
    let acker = Arc::new(RecordingAcker::default());
    let forwarder = Arc::new(RecordingForwarder::failing());
    let fallbacker = TimerFallbacker::new(TimerFallbackerConfig {
        max_attempts: 3,
        latency_factor: Duration::from_millis(5),
        max_backoff: Duration::from_millis(10),
    })
    .unwrap();
    let sender = Sender::new("trace", 1, settings(60_000, 1, 10), acker.clone())
        .with_fallbacker(Arc::new(fallbacker));
    let h = harness(sender, forwarder, acker);

    h.sender.input_channel(0).unwrap().send(context(7)).await.unwrap();
    let h = h.stop().await;

    assert_eq!(h.forwarder.batches().len(), 3);
    assert_eq!(*h.acker.0.lock(), [offset(7)]);
}

#[tokio::test]
async fn test_local_and_unmatched_events_not_forwarded() {
    let acker = Arc::new(RecordingAcker::default());
    let forwarder = Arc::new(RecordingForwarder::default());
    let h = harness(
        Sender::new("trace", 1, settings(60_000, 1, 10), acker.clone()),
        forwarder,
        acker,
    );

    let mut ctx = context(0);
    ctx.insert("scratch", Event::new("scratch", EventType::Segment, "x").with_remote(false));
    ctx.insert("log", Event::new("log", EventType::Log, "x"));
    h.sender.input_channel(0).unwrap().send(ctx).await.unwrap();
    let h = h.stop().await;

    assert_eq!(h.forwarder.batches(), [["e0"]]);
    assert_eq!(*h.acker.0.lock(), [offset(0)]);
}

#[tokio::test]
async fn test_shutdown_drains_open_batch() {
    let acker = Arc::new(RecordingAcker::default());
    let forwarder = Arc::new(RecordingForwarder::default());
    let h = harness(
        Sender::new("trace", 2, settings(60_000, 100, 10), acker.clone()),
        forwarder,
        acker,
    );

    h.sender.input_channel(0).unwrap().send(context(0)).await.unwrap();
    h.sender.input_channel(1).unwrap().send(context(1)).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    let h = h.stop().await;

    let mut names = h.forwarder.names();
    names.sort();
    assert_eq!(names, ["e0", "e1"]);
    assert_eq!(h.acker.0.lock().len(), 2);
}

#[tokio::test]
async fn test_shutdown_delivers_queued_input() {
    let acker = Arc::new(RecordingAcker::default());
    let forwarder = Arc::new(RecordingForwarder::default());
    let mut s = settings(60_000, 100, 10);
    s.max_buffer_size = 2;
    let h = harness(Sender::new("trace", 1, s, acker.clone()), forwarder, acker);

    let input = h.sender.input_channel(0).unwrap();
    for i in 0..5 {
        input.send(context(i)).await.unwrap();
    }
    // Cancel before the buffering task had a chance to read anything
    let h = h.stop().await;

    assert_eq!(h.forwarder.batches(), [vec!["e0", "e1"], vec!["e2", "e3"], vec!["e4"]]);
    assert_eq!(*h.acker.0.lock(), [offset(1), offset(3), offset(4)]);
    assert!(input.send(context(5)).await.is_err());
}

#[tokio::test]
async fn test_start_twice_fails() {
    let acker = Arc::new(RecordingAcker::default());
    let h = harness(
        Sender::new("trace", 1, SenderSettings::default(), acker.clone()),
        Arc::new(RecordingForwarder::default()),
        acker,
    );
    let mut again = JoinSet::new();
    assert!(matches!(
        h.sender.start(&mut again, CancellationToken::new()),
        Err(PipelineError::Unavailable(_))
    ));
    h.stop().await;
}

// ============================================================================
// Sync path
// ============================================================================

#[tokio::test]
async fn test_sync_invoke() {
    let acker = Arc::new(RecordingAcker::default());
    let sender = Sender::new("sync", 1, SenderSettings::default(), acker)
        .with_forwarder(Arc::new(RecordingForwarder::default()), None);

    let reply = sender
        .sync_invoke(Event::new("cfg", EventType::Segment, "q"))
        .await
        .unwrap();
    assert_eq!(reply.name, "cfg-reply");

    let err = sender
        .sync_invoke(Event::new("cfg", EventType::ConfigSync, "q"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoSyncForwarder(EventType::ConfigSync)));
}
