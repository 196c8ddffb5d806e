//! One upstream address and its connections
//!
//! Every call checks a connection out of the subchannel's idle pool (dialing
//! a new one when the pool is empty) and owns it for the whole exchange, so
//! concurrent forwarders never wait on each other's round trips.

use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use satellite_protocol::{Frame, FrameKind, read_frame, write_frame};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::config::NativeClientConfig;
use crate::error::{ClientError, Result};
use crate::tls;

/// Connectivity state of a subchannel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectivityState {
    Idle = 0,
    Connecting = 1,
    Ready = 2,
    TransientFailure = 3,
    Shutdown = 4,
}

impl ConnectivityState {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::TransientFailure,
            4 => Self::Shutdown,
            _ => Self::Idle,
        }
    }

    /// Ready and idle both count as usable
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Ready | Self::Idle)
    }
}

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

struct Connection {
    stream: Box<dyn Stream>,
    buf: BytesMut,
}

/// Dial settings shared by every subchannel of one client
#[derive(Clone)]
pub(crate) struct Dialer {
    pub(crate) connect_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) keepalive: Option<Duration>,
    pub(crate) max_idle: usize,
    pub(crate) tls: Option<TlsConnector>,
    pub(crate) tls_server_name: Option<String>,
}

impl Dialer {
    pub(crate) fn new(config: &NativeClientConfig, tls: Option<TlsConnector>) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            keepalive: config.tcp_keepalive.then_some(config.tcp_keepalive_interval),
            max_idle: config.max_idle_connections,
            tls,
            tls_server_name: config.tls_server_name.clone(),
        }
    }
}

/// A single upstream address with lazily established connections
pub struct Subchannel {
    addr: String,
    state: AtomicU8,
    idle: Mutex<Vec<Connection>>,
    dialer: Dialer,
}

impl fmt::Debug for Subchannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subchannel")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("idle", &self.idle_connections())
            .finish()
    }
}

impl Subchannel {
    pub(crate) fn new(addr: impl Into<String>, dialer: Dialer) -> Self {
        Self {
            addr: addr.into(),
            state: AtomicU8::new(ConnectivityState::Idle as u8),
            idle: Mutex::new(Vec::new()),
            dialer,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectivityState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Connections parked for reuse
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    /// Send one frame and wait for the reply
    ///
    /// An `Error` reply becomes `ClientError::Status`. Any transport failure
    /// drops the connection used and marks the subchannel `TransientFailure`.
    pub async fn call(&self, frame: &Frame) -> Result<Frame> {
        if self.state() == ConnectivityState::Shutdown {
            return Err(ClientError::Closed);
        }
        let pooled = self.idle.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => self.dial().await?,
        };

        let exchange = async {
            write_frame(&mut conn.stream, frame).await?;
            read_frame(&mut conn.stream, &mut conn.buf).await
        };
        let reply = match timeout(self.dialer.request_timeout, exchange).await {
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => {
                self.fail();
                return Err(ClientError::Connect {
                    addr: self.addr.clone(),
                    source: ErrorKind::ConnectionReset.into(),
                });
            }
            Ok(Err(e)) => {
                self.fail();
                return Err(e.into());
            }
            Err(_) => {
                self.fail();
                return Err(ClientError::Timeout("upstream request"));
            }
        };

        self.release(conn);
        if self.state() != ConnectivityState::Shutdown {
            self.set_state(ConnectivityState::Ready);
        }
        if reply.kind == FrameKind::Error {
            let (code, message) = reply.status()?;
            return Err(ClientError::status(code, message));
        }
        Ok(reply)
    }

    /// Connect if needed, then ping
    pub async fn probe(&self) -> ConnectivityState {
        match self.call(&Frame::ping()).await {
            Ok(reply) if reply.kind == FrameKind::Pong => {
                trace!(addr = %self.addr, "probe ok");
            }
            Ok(reply) => {
                debug!(addr = %self.addr, kind = reply.kind.as_str(), "unexpected probe reply");
            }
            Err(e) => {
                debug!(addr = %self.addr, error = %e, "probe failed");
            }
        }
        self.state()
    }

    /// Drop every idle connection; later calls fail with `Closed`
    pub async fn shutdown(&self) {
        self.set_state(ConnectivityState::Shutdown);
        self.idle.lock().clear();
    }

    /// Park a healthy connection, or close it when the pool is full
    fn release(&self, conn: Connection) {
        if self.state() == ConnectivityState::Shutdown {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.dialer.max_idle {
            idle.push(conn);
        }
    }

    /// The upstream broke one connection; the parked ones are suspect too
    fn fail(&self) {
        self.idle.lock().clear();
        if self.state() != ConnectivityState::Shutdown {
            self.set_state(ConnectivityState::TransientFailure);
        }
    }

    async fn dial(&self) -> Result<Connection> {
        self.set_state(ConnectivityState::Connecting);
        match self.connect().await {
            Ok(conn) => {
                self.set_state(ConnectivityState::Ready);
                debug!(addr = %self.addr, tls = self.dialer.tls.is_some(), "connected to upstream");
                Ok(conn)
            }
            Err(e) => {
                self.set_state(ConnectivityState::TransientFailure);
                Err(e)
            }
        }
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = match timeout(self.dialer.connect_timeout, TcpStream::connect(&self.addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ClientError::Connect {
                    addr: self.addr.clone(),
                    source,
                });
            }
            Err(_) => return Err(ClientError::Timeout("upstream connect")),
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(addr = %self.addr, error = %e, "failed to set TCP_NODELAY");
        }
        if let Some(interval) = self.dialer.keepalive {
            let keepalive = TcpKeepalive::new().with_time(interval);
            #[cfg(target_os = "linux")]
            let keepalive = keepalive.with_interval(interval);
            if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
                debug!(addr = %self.addr, error = %e, "failed to set TCP keep-alive");
            }
        }

        let stream: Box<dyn Stream> = match &self.dialer.tls {
            Some(connector) => {
                let name = tls::server_name(&self.addr, self.dialer.tls_server_name.as_deref())?;
                let tls_stream = timeout(self.dialer.connect_timeout, connector.connect(name, stream))
                    .await
                    .map_err(|_| ClientError::Timeout("tls handshake"))?
                    .map_err(|source| ClientError::Connect {
                        addr: self.addr.clone(),
                        source,
                    })?;
                Box::new(tls_stream)
            }
            None => Box::new(stream),
        };

        Ok(Connection {
            stream,
            buf: BytesMut::with_capacity(4096),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use satellite_protocol::{Event, EventType};
    use tokio::net::TcpListener;
    use tokio::sync::Barrier;

    use super::*;

    /// Upstream that holds each data reply until `hold` connections have a
    /// request in flight; returns the address and the accepted count
    async fn spawn_upstream(hold: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(hold));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    let mut buf = BytesMut::new();
                    while let Ok(Some(frame)) = read_frame(&mut stream, &mut buf).await {
                        let reply = match frame.kind {
                            FrameKind::Ping => Frame::pong(),
                            _ => {
                                barrier.wait().await;
                                Frame::ack()
                            }
                        };
                        if write_frame(&mut stream, &reply).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        (addr, accepted)
    }

    fn subchannel(addr: &str) -> Subchannel {
        let config = NativeClientConfig::new(addr)
            .with_connect_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(5));
        Subchannel::new(addr, Dialer::new(&config, None))
    }

    fn data(name: &str) -> Frame {
        Frame::data(&[Event::new(name, EventType::Segment, "span")]).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_calls_do_not_share_a_stream() {
        let (addr, accepted) = spawn_upstream(2).await;
        let sub = subchannel(&addr);

        // each reply waits for the other request, so one shared stream
        // would never complete
        let (frame_a, frame_b) = (data("a"), data("b"));
        let (a, b) = timeout(Duration::from_secs(3), async {
            tokio::join!(sub.call(&frame_a), sub.call(&frame_b))
        })
        .await
        .expect("calls serialized on one connection");

        assert_eq!(a.unwrap().kind, FrameKind::Ack);
        assert_eq!(b.unwrap().kind, FrameKind::Ack);
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(sub.idle_connections(), 2);
        assert_eq!(sub.state(), ConnectivityState::Ready);
    }

    #[tokio::test]
    async fn test_sequential_calls_reuse_connection() {
        let (addr, accepted) = spawn_upstream(1).await;
        let sub = subchannel(&addr);

        for name in ["a", "b", "c"] {
            assert_eq!(sub.call(&data(name)).await.unwrap().kind, FrameKind::Ack);
        }
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(sub.idle_connections(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_drops_idle_connections() {
        let (addr, _) = spawn_upstream(1).await;
        let sub = subchannel(&addr);
        sub.call(&data("a")).await.unwrap();
        assert_eq!(sub.idle_connections(), 1);

        sub.shutdown().await;
        assert_eq!(sub.idle_connections(), 0);
        assert!(matches!(sub.call(&data("b")).await, Err(ClientError::Closed)));
    }
}
