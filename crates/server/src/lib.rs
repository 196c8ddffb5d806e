//! Satellite Server - Shared ingress listener
//!
//! One [`NativeServer`] per configured server plugin. Receivers register an
//! [`EventHandler`] for the event types they own; the server accepts
//! connections (subject to [`Admission`]), decodes native frames and routes
//! events to the handler for their type.
//!
//! # Replies
//!
//! | Request        | Reply                                       |
//! |----------------|---------------------------------------------|
//! | `Ping`         | `Pong`                                      |
//! | `Data`         | `Ack`, or `Error` with the handler's status |
//! | `SyncRequest`  | `SyncResponse`, or `Error`                  |
//! | anything else  | `Error(Unimplemented)`                      |
//!
//! A frame that cannot be parsed gets `Error(InvalidArgument)` and the
//! connection is closed.

mod admission;
mod config;
mod error;
mod handler;

pub use admission::{Admission, AdmissionMetrics, ConnectionGuard, Rejection};
pub use config::NativeServerConfig;
pub use error::{HandlerError, Result, ServerError};
pub use handler::{EventHandler, HandlerRegistry};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use satellite_metrics::MetricsRegistry;
use satellite_protocol::{
    EventType, Frame, FrameKind, ProtocolError, StatusCode, read_frame, write_frame,
};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared framed-TCP server
pub struct NativeServer {
    name: String,
    config: NativeServerConfig,
    handlers: HandlerRegistry,
    admission: Arc<Admission>,
    listener: Mutex<Option<TcpListener>>,
}

impl NativeServer {
    pub fn new(name: impl Into<String>, config: NativeServerConfig) -> Result<Self> {
        Self::with_registry(name, config, None)
    }

    pub fn with_registry(
        name: impl Into<String>,
        config: NativeServerConfig,
        registry: Option<&MetricsRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let metrics = registry.map_or_else(AdmissionMetrics::default, |r| {
            AdmissionMetrics::registered(r, &name)
        });
        let admission = Admission::new(config.max_connections, config.max_cpu_utilization, metrics);
        Ok(Self {
            name,
            config,
            handlers: HandlerRegistry::default(),
            admission,
            listener: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn admission(&self) -> &Arc<Admission> {
        &self.admission
    }

    /// Claim `event_type` for `handler`
    pub fn register(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> Result<()> {
        self.handlers.register(event_type, handler)?;
        debug!(server = %self.name, event_type = %event_type, "handler registered");
        Ok(())
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Bind the listener; returns the bound address
    pub async fn bind(&self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.config.address)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.config.address.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        *self.listener.lock() = Some(listener);
        info!(server = %self.name, address = %addr, "server listening");
        Ok(addr)
    }

    /// Accept connections until cancelled
    pub async fn serve(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| ServerError::NotBound(self.name.clone()))?;
        let sampler = self
            .admission
            .spawn_cpu_sampler(self.config.cpu_sample_period, cancel.child_token());

        self.accept_loop(listener, cancel).await;
        sampler.abort();
        info!(server = %self.name, "server stopped");
        Ok(())
    }

    async fn accept_loop(self: &Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, peer)) => self.on_accept(stream, peer, &cancel),
                    Err(e) => warn!(server = %self.name, error = %e, "accept error"),
                },
            }
        }
    }

    fn on_accept(self: &Arc<Self>, mut stream: TcpStream, peer: SocketAddr, cancel: &CancellationToken) {
        let guard = match self.admission.try_admit() {
            Ok(guard) => guard,
            Err(rejection) => {
                debug!(server = %self.name, peer = %peer, reason = %rejection, "connection rejected");
                tokio::spawn(async move {
                    let reply = Frame::error(StatusCode::ResourceExhausted, rejection.to_string());
                    let _ = tokio::time::timeout(
                        Duration::from_secs(1),
                        write_frame(&mut stream, &reply),
                    )
                    .await;
                });
                return;
            }
        };

        self.configure_socket(&stream);
        let server = Arc::clone(self);
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = server.handle_connection(stream, cancel).await {
                debug!(server = %server.name, peer = %peer, error = %e, "connection error");
            }
        });
    }

    fn configure_socket(&self, stream: &TcpStream) {
        if self.config.nodelay && stream.set_nodelay(true).is_err() {
            debug!("failed to set TCP_NODELAY");
        }
        if self.config.keepalive {
            let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(60));
            #[cfg(target_os = "linux")]
            let keepalive = keepalive.with_interval(Duration::from_secs(10));
            if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
                debug!(error = %e, "failed to set TCP keepalive");
            }
        }
    }

    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        cancel: CancellationToken,
    ) -> std::result::Result<(), ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.config.read_buffer_size);
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = read_frame(&mut stream, &mut buf) => frame,
            };
            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) if e.is_malformed() => {
                    let reply = Frame::error(StatusCode::InvalidArgument, e.to_string());
                    write_frame(&mut stream, &reply).await?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            let reply = self.reply_to(frame).await?;
            write_frame(&mut stream, &reply).await?;
        }
    }

    async fn reply_to(&self, frame: Frame) -> std::result::Result<Frame, ProtocolError> {
        let reply = match frame.kind {
            FrameKind::Ping => Frame::pong(),
            FrameKind::Data => match frame.events() {
                Ok(events) => match self.handlers.dispatch(events).await {
                    Ok(()) => Frame::ack(),
                    Err(e) => Frame::error(e.code, e.message),
                },
                Err(e) => Frame::error(StatusCode::InvalidArgument, e.to_string()),
            },
            FrameKind::SyncRequest => match frame.event() {
                Ok(event) => match self.handlers.dispatch_sync(event).await {
                    Ok(response) => Frame::sync_response(&response)?,
                    Err(e) => Frame::error(e.code, e.message),
                },
                Err(e) => Frame::error(StatusCode::InvalidArgument, e.to_string()),
            },
            other => Frame::error(
                StatusCode::Unimplemented,
                format!("unexpected {} frame", other.as_str()),
            ),
        };
        Ok(reply)
    }
}

impl std::fmt::Debug for NativeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeServer")
            .field("name", &self.name)
            .field("address", &self.config.address)
            .field("handlers", &self.handlers.registered())
            .finish()
    }
}
