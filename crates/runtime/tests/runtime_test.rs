//! Whole process: config in, events out through a fake upstream

use std::net::TcpListener as StdTcpListener;
use std::time::Duration;

use bytes::BytesMut;
use satellite_config::Config;
use satellite_protocol::{Event, EventType, Frame, FrameKind, StatusCode, read_frame, write_frame};
use satellite_runtime::{PipeBuilder, PluginRegistry, Runtime, RuntimeError, SharingManager};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Helpers
// =============================================================================

/// Upstream that acks data frames and reports their events
async fn spawn_upstream() -> (String, mpsc::UnboundedReceiver<Event>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = seen_tx.clone();
            tokio::spawn(async move {
                let mut buf = BytesMut::new();
                while let Ok(Some(frame)) = read_frame(&mut stream, &mut buf).await {
                    let reply = match frame.kind {
                        FrameKind::Ping => Frame::pong(),
                        FrameKind::Data => {
                            for event in frame.events().unwrap() {
                                let _ = seen.send(event);
                            }
                            Frame::ack()
                        }
                        _ => Frame::error(StatusCode::Unimplemented, "unsupported"),
                    };
                    if write_frame(&mut stream, &reply).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    (addr, seen_rx)
}

fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn connect(addr: &str) -> TcpStream {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(stream) = TcpStream::connect(addr).await {
                return stream;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("satellite server never came up")
}

fn config(upstream: &str, ingress_port: u16) -> Config {
    format!(
        r#"
telemetry:
  export_type: none
sharing:
  clients:
    - plugin_name: native-client
      server_addr: {upstream}
      check_period: 1
      connect_timeout: 500ms
  servers:
    - plugin_name: native-server
      address: 127.0.0.1:{ingress_port}
      max_cpu_utilization: 0
pipes:
  - common_config:
      pipe_name: trace
    gatherer:
      server_name: native-server
      receiver:
        plugin_name: native-receiver
        event_types: [segment]
      queue:
        plugin_name: memory-queue
        partition: 2
    processor:
      filters:
        - plugin_name: noop
    sender:
      client_name: native-client
      flush_time: 100ms
      forwarders:
        - plugin_name: native-forwarder
          forward_type: segment
  - common_config:
      pipe_name: meter
    gatherer:
      fetcher:
        plugin_name: self-meter
        include: [pipe_received]
      fetch_interval: 200ms
    sender:
      client_name: native-client
      flush_time: 100ms
      fallbacker:
        plugin_name: timer-fallbacker
        latency_factor: 100ms
        max_backoff: 200ms
      forwarders:
        - plugin_name: native-forwarder
          forward_type: meter
"#
    )
    .parse()
    .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_events_flow_end_to_end() {
    let (upstream, mut seen) = spawn_upstream().await;
    let port = free_port();
    let runtime = Runtime::new(config(&upstream, port))
        .unwrap()
        .with_shutdown_timeout(Duration::from_secs(2));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runtime.run(cancel.clone()));

    let mut stream = connect(&format!("127.0.0.1:{port}")).await;
    let events: Vec<Event> = (0..4)
        .map(|i| Event::new(format!("span-{i}"), EventType::Segment, "span"))
        .collect();
    write_frame(&mut stream, &Frame::data(&events).unwrap())
        .await
        .unwrap();
    let mut buf = BytesMut::new();
    let reply = read_frame(&mut stream, &mut buf).await.unwrap().unwrap();
    assert_eq!(reply.kind, FrameKind::Ack);

    let mut spans = Vec::new();
    let mut meters = 0;
    timeout(Duration::from_secs(10), async {
        while spans.len() < 4 || meters == 0 {
            let event = seen.recv().await.unwrap();
            match event.event_type {
                EventType::Segment => spans.push(event.name),
                EventType::Meter => meters += 1,
                other => panic!("unexpected event type {other:?}"),
            }
        }
    })
    .await
    .expect("upstream never saw every event");

    spans.sort();
    assert_eq!(spans, ["span-0", "span-1", "span-2", "span-3"]);

    cancel.cancel();
    let result = timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
    assert!(result.is_ok(), "runtime failed: {result:?}");
}

#[tokio::test]
async fn test_unknown_plugin_fails_startup() {
    let (upstream, _seen) = spawn_upstream().await;
    let mut config = config(&upstream, free_port());
    config.pipes[0]
        .gatherer
        .as_mut()
        .unwrap()
        .queue
        .as_mut()
        .unwrap()
        .set("plugin_name", "kafka-queue");

    let result = Runtime::new(config)
        .unwrap()
        .run(CancellationToken::new())
        .await;
    assert!(matches!(result, Err(RuntimeError::UnknownPlugin { .. })));
}

#[tokio::test]
async fn test_pipe_builder_wires_partitions() {
    let (upstream, _seen) = spawn_upstream().await;
    let config = config(&upstream, free_port());
    let registry = PluginRegistry::builtin().unwrap();
    let runtime = Runtime::new(config.clone()).unwrap();
    let sharing = SharingManager::build(&config.sharing, &registry, runtime.metrics()).unwrap();
    assert!(sharing.client("native-client").is_some());
    assert!(sharing.server("native-server").is_some());

    let builder = PipeBuilder::new(&registry, &sharing, runtime.metrics());
    let trace = builder.build(&config.pipes[0]).unwrap();
    assert_eq!(trace.name(), "trace");
    assert_eq!(trace.gatherer().partition_count(), 2);
    assert_eq!(trace.sender().partition_count(), 2);
    assert_eq!(trace.sender().forward_types(), vec![EventType::Segment]);

    // the receiver claimed segment on the shared server
    let meter = builder.build(&config.pipes[1]).unwrap();
    assert_eq!(meter.gatherer().partition_count(), 1);
    assert!(
        sharing
            .server("native-server")
            .unwrap()
            .handlers()
            .get(EventType::Segment)
            .is_some()
    );
}

#[tokio::test]
async fn test_mmap_pipe_shuts_down_cleanly() {
    let (upstream, mut seen) = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
sharing:
  clients:
    - plugin_name: native-client
      server_addr: {upstream}
pipes:
  - common_config:
      pipe_name: meter
    gatherer:
      fetcher:
        plugin_name: self-meter
      fetch_interval: 50ms
      queue:
        plugin_name: mmap-queue
        segment_size: 4096
        queue_capacity_segments: 8
        max_in_mem_segments: 3
        queue_dir: {dir}
    sender:
      client_name: native-client
      flush_time: 50ms
      forwarders:
        - plugin_name: native-forwarder
          forward_type: meter
"#,
        dir = dir.path().display()
    );
    let config: Config = yaml.parse().unwrap();
    let runtime = Runtime::new(config)
        .unwrap()
        .with_shutdown_timeout(Duration::from_secs(2));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runtime.run(cancel.clone()));

    let first = timeout(Duration::from_secs(10), seen.recv())
        .await
        .expect("no meter event forwarded")
        .unwrap();
    assert_eq!(first.event_type, EventType::Meter);
    assert!(dir.path().join("meter").join("partition-0").join("meta.dat").exists());

    cancel.cancel();
    let result = timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
    assert!(result.is_ok(), "runtime failed: {result:?}");
}

#[test]
fn test_shipped_config_assembles() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/satellite_config.yaml");
    let mut config = Config::from_file(path).unwrap();
    let dir = tempfile::tempdir().unwrap();
    for pipe in &mut config.pipes {
        if let Some(queue) = pipe.gatherer.as_mut().and_then(|g| g.queue.as_mut())
            && queue.plugin_name() == Some("mmap-queue")
        {
            queue.set("queue_dir", dir.path().display().to_string());
        }
    }

    let registry = PluginRegistry::builtin().unwrap();
    let runtime = Runtime::new(config.clone()).unwrap();
    let sharing = SharingManager::build(&config.sharing, &registry, runtime.metrics()).unwrap();
    let builder = PipeBuilder::new(&registry, &sharing, runtime.metrics());

    let names: Vec<String> = config
        .pipes
        .iter()
        .map(|p| builder.build(p).unwrap().name().to_string())
        .collect();
    assert_eq!(names, ["segment-pipe", "log-pipe", "self-meter-pipe"]);
}
