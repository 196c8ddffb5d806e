//! Shared client against a scripted upstream

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use satellite_client::{CallContext, ClientError, ClientStatus, NativeClientConfig, SharedClient};
use satellite_protocol::{Event, EventType, Frame, FrameKind, StatusCode, read_frame, write_frame};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Upstream that acks data, echoes sync requests and answers pings.
/// Data frames whose first event is named "reject" get an error reply.
async fn spawn_upstream() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = BytesMut::new();
                while let Ok(Some(frame)) = read_frame(&mut stream, &mut buf).await {
                    let reply = match frame.kind {
                        FrameKind::Ping => Frame::pong(),
                        FrameKind::Data => {
                            let events = frame.events().unwrap();
                            if events.first().is_some_and(|e| e.name == "reject") {
                                Frame::error(StatusCode::Unavailable, "backend overloaded")
                            } else {
                                Frame::ack()
                            }
                        }
                        FrameKind::SyncRequest => {
                            let mut event = frame.event().unwrap();
                            event.name = format!("{}-reply", event.name);
                            Frame::sync_response(&event).unwrap()
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
    (addr, handle)
}

fn config(addr: &str) -> NativeClientConfig {
    NativeClientConfig::new(addr)
        .with_check_period(1)
        .with_connect_timeout(Duration::from_millis(500))
        .with_request_timeout(Duration::from_secs(2))
}

async fn wait_for(rx: &mut tokio::sync::watch::Receiver<ClientStatus>, want: ClientStatus) {
    timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .expect("status never changed")
        .unwrap();
}

#[tokio::test]
async fn test_probe_connects() {
    let (addr, _upstream) = spawn_upstream().await;
    let client = Arc::new(SharedClient::new("native-client", config(&addr)).unwrap());
    assert_eq!(client.status(), ClientStatus::Disconnect);

    let cancel = CancellationToken::new();
    let task = client.start(cancel.clone());
    let mut status = client.subscribe();
    wait_for(&mut status, ClientStatus::Connected).await;

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_data_and_sync_calls() {
    let (addr, _upstream) = spawn_upstream().await;
    let client = SharedClient::new("native-client", config(&addr)).unwrap();

    let events = vec![Event::new("seg", EventType::Segment, "payload")];
    let reply = client
        .call(&Frame::data(&events).unwrap(), &mut CallContext::default())
        .await
        .unwrap();
    assert_eq!(reply.kind, FrameKind::Ack);

    let request = Event::new("config", EventType::ConfigSync, "q");
    let reply = client
        .call(&Frame::sync_request(&request).unwrap(), &mut CallContext::default())
        .await
        .unwrap();
    assert_eq!(reply.event().unwrap().name, "config-reply");
}

#[tokio::test]
async fn test_error_reply_flips_to_disconnect() {
    let (addr, _upstream) = spawn_upstream().await;
    let client = SharedClient::new("native-client", config(&addr)).unwrap();
    client.check().await;
    assert_eq!(client.status(), ClientStatus::Connected);

    let mut status = client.subscribe();
    let events = vec![Event::new("reject", EventType::Log, "x")];
    let err = client
        .call(&Frame::data(&events).unwrap(), &mut CallContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status { code: StatusCode::Unavailable, .. }));
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), ClientStatus::Disconnect);

    // The next probe sees a healthy upstream again
    client.check().await;
    assert_eq!(client.status(), ClientStatus::Connected);
}

#[tokio::test]
async fn test_unreachable_upstream_stays_disconnected() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let client = SharedClient::new("native-client", config(&addr)).unwrap();
    client.check().await;
    assert_eq!(client.status(), ClientStatus::Disconnect);

    let err = client
        .call(&Frame::ping(), &mut CallContext::default())
        .await
        .unwrap_err();
    assert!(err.is_disconnect());
}

#[tokio::test]
async fn test_invalid_address_rejected() {
    let err = SharedClient::new("native-client", NativeClientConfig::new("no-port")).unwrap_err();
    assert!(matches!(err, ClientError::InvalidConfig(_)));
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
server_addr: a:1,b:2
check_period: 10
request_timeout: 3s
discovery:
  service: oap
  namespaces: [obs]
  port: 12800
"#;
    let config: NativeClientConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.check_period(), Duration::from_secs(10));
    assert_eq!(config.request_timeout, Duration::from_secs(3));
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    let discovery = config.discovery.clone().unwrap();
    assert_eq!(discovery.port, 12800);
    assert_eq!(discovery.cluster_domain, "cluster.local");
    assert!(!config.tls_enabled());
}
