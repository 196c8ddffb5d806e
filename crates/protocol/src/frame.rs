//! Native wire frames
//!
//! Each frame is prefixed with a 4-byte big-endian length covering the kind
//! byte and the body:
//!
//! ```text
//! [4 bytes: length (big-endian)][1 byte: kind][N bytes: body]
//! ```
//!
//! | Kind | Body |
//! |---|---|
//! | `Data` | `[u32 count]([u32 len][event record])*` |
//! | `Ack` | empty |
//! | `SyncRequest` / `SyncResponse` | one event record |
//! | `Error` | `[u8 status][utf-8 message]` |
//! | `Ping` / `Pong` | empty |
//!
//! Every `Data` frame is answered with `Ack` or `Error`; every `SyncRequest`
//! with `SyncResponse` or `Error`; every `Ping` with `Pong`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Event, FRAME_PREFIX_SIZE, MAX_FRAME_SIZE, ProtocolError, Result, StatusCode};

/// Frame kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Data = 1,
    Ack = 2,
    SyncRequest = 3,
    SyncResponse = 4,
    Error = 5,
    Ping = 6,
    Pong = 7,
}

impl FrameKind {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Data),
            2 => Some(Self::Ack),
            3 => Some(Self::SyncRequest),
            4 => Some(Self::SyncResponse),
            5 => Some(Self::Error),
            6 => Some(Self::Ping),
            7 => Some(Self::Pong),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Ack => "ack",
            Self::SyncRequest => "sync_request",
            Self::SyncResponse => "sync_response",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

/// A decoded frame: kind plus raw body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub body: Bytes,
}

impl Frame {
    fn empty(kind: FrameKind) -> Self {
        Self {
            kind,
            body: Bytes::new(),
        }
    }

    /// Data frame carrying a batch of events
    pub fn data(events: &[Event]) -> Result<Self> {
        let mut body = BytesMut::new();
        let count = u32::try_from(events.len()).map_err(|_| ProtocolError::FieldTooLong {
            field: "events",
            len: events.len(),
        })?;
        body.put_u32(count);
        for event in events {
            let len = event.encoded_len();
            body.put_u32(len as u32);
            event.encode_to(&mut body)?;
        }
        Ok(Self {
            kind: FrameKind::Data,
            body: body.freeze(),
        })
    }

    pub fn ack() -> Self {
        Self::empty(FrameKind::Ack)
    }

    pub fn ping() -> Self {
        Self::empty(FrameKind::Ping)
    }

    pub fn pong() -> Self {
        Self::empty(FrameKind::Pong)
    }

    pub fn sync_request(event: &Event) -> Result<Self> {
        Ok(Self {
            kind: FrameKind::SyncRequest,
            body: event.encode()?,
        })
    }

    pub fn sync_response(event: &Event) -> Result<Self> {
        Ok(Self {
            kind: FrameKind::SyncResponse,
            body: event.encode()?,
        })
    }

    pub fn error(code: StatusCode, message: impl AsRef<str>) -> Self {
        let message = message.as_ref();
        let mut body = BytesMut::with_capacity(1 + message.len());
        body.put_u8(code.as_u8());
        body.put_slice(message.as_bytes());
        Self {
            kind: FrameKind::Error,
            body: body.freeze(),
        }
    }

    /// Decode the events of a `Data` frame
    pub fn events(&self) -> Result<Vec<Event>> {
        self.expect(FrameKind::Data)?;
        let total = self.body.len();
        let mut buf = self.body.clone();
        if buf.remaining() < 4 {
            return Err(ProtocolError::too_short(4, total));
        }
        let count = buf.get_u32() as usize;
        let mut events = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            if buf.remaining() < 4 {
                return Err(ProtocolError::too_short(total - buf.remaining() + 4, total));
            }
            let len = buf.get_u32() as usize;
            if buf.remaining() < len {
                return Err(ProtocolError::too_short(total - buf.remaining() + len, total));
            }
            events.push(Event::decode(buf.split_to(len))?);
        }
        Ok(events)
    }

    /// Decode the single event of a sync request or response
    pub fn event(&self) -> Result<Event> {
        match self.kind {
            FrameKind::SyncRequest | FrameKind::SyncResponse => Event::decode(self.body.clone()),
            other => Err(ProtocolError::unexpected_frame("sync", other.as_str())),
        }
    }

    /// Decode status and message of an `Error` frame
    pub fn status(&self) -> Result<(StatusCode, String)> {
        self.expect(FrameKind::Error)?;
        let Some((&code, message)) = self.body.split_first() else {
            return Err(ProtocolError::too_short(1, 0));
        };
        Ok((
            StatusCode::from_u8(code),
            String::from_utf8_lossy(message).into_owned(),
        ))
    }

    fn expect(&self, kind: FrameKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(ProtocolError::unexpected_frame(kind.as_str(), self.kind.as_str()))
        }
    }
}

/// Append an encoded frame to `buf`
pub fn encode_frame(frame: &Frame, buf: &mut BytesMut) -> Result<()> {
    let len = 1 + frame.body.len();
    if len > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge {
            size: len as u32,
            limit: MAX_FRAME_SIZE,
        });
    }
    buf.reserve(FRAME_PREFIX_SIZE + len);
    buf.put_u32(len as u32);
    buf.put_u8(frame.kind as u8);
    buf.put_slice(&frame.body);
    Ok(())
}

/// Peek at the next frame length without consuming the buffer
///
/// Returns:
/// - Ok(Some(len)) if a complete frame is buffered (len excludes the prefix)
/// - Ok(None) if more data is needed
/// - Err if the announced length is invalid
#[inline]
pub fn peek_frame_len(buf: &BytesMut) -> Result<Option<usize>> {
    if buf.len() < FRAME_PREFIX_SIZE {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }
    if len == 0 {
        return Err(ProtocolError::too_short(1, 0));
    }

    if buf.len() < FRAME_PREFIX_SIZE + len as usize {
        return Ok(None);
    }
    Ok(Some(len as usize))
}

/// Split one complete frame off the front of `buf`
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Frame>> {
    let Some(len) = peek_frame_len(buf)? else {
        return Ok(None);
    };
    buf.advance(FRAME_PREFIX_SIZE);
    let mut raw = buf.split_to(len).freeze();
    let kind_byte = raw.get_u8();
    let kind = FrameKind::from_u8(kind_byte).ok_or(ProtocolError::InvalidFrameKind(kind_byte))?;
    Ok(Some(Frame { kind, body: raw }))
}

/// Read one frame, buffering partial reads in `buf`
///
/// Returns `Ok(None)` on clean EOF between frames.
pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = decode_frame(buf)? {
            return Ok(Some(frame));
        }
        if reader.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-frame",
            )));
        }
    }
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(FRAME_PREFIX_SIZE + 1 + frame.body.len());
    encode_frame(frame, &mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
