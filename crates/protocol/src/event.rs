//! Event - typed payload plus envelope
//!
//! # Record Encoding
//!
//! This is the byte layout the durable queue persists and the native frames
//! carry. All integers are little-endian.
//!
//! ```text
//! [u8 version][u8 type][u8 flags][i64 timestamp]?
//! [u16 name_len][name]
//! [u16 meta_count]([u16 key_len][key][u32 val_len][val])*
//! [u32 payload_len][payload]
//! ```
//!
//! `flags` bit 0 is `remote`, bit 1 marks a present timestamp.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{EVENT_ENCODING_VERSION, EventType, ProtocolError, Result};

const FLAG_REMOTE: u8 = 0b01;
const FLAG_TIMESTAMP: u8 = 0b10;

/// An opaque typed payload plus envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event name, used as the key inside an output context
    pub name: String,

    /// Type tag
    pub event_type: EventType,

    /// Optional timestamp (milliseconds since epoch)
    pub timestamp: Option<i64>,

    /// Whether the event must be forwarded upstream
    pub remote: bool,

    /// Optional metadata
    pub meta: BTreeMap<String, String>,

    /// Raw payload
    pub payload: Bytes,
}

impl Event {
    /// Create a remote event with the given name, type and payload
    pub fn new(name: impl Into<String>, event_type: EventType, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            event_type,
            timestamp: None,
            remote: true,
            meta: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Set the timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the remote flag
    #[must_use]
    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Size of the encoded record in bytes
    pub fn encoded_len(&self) -> usize {
        let mut len = 3 + 2 + self.name.len() + 2 + 4 + self.payload.len();
        if self.timestamp.is_some() {
            len += 8;
        }
        for (k, v) in &self.meta {
            len += 2 + k.len() + 4 + v.len();
        }
        len
    }

    /// Encode into a freshly allocated buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode by appending to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        let name_len = u16_len("name", self.name.len())?;
        let meta_count = u16_len("meta", self.meta.len())?;
        let payload_len = u32_len("payload", self.payload.len())?;

        buf.reserve(self.encoded_len());
        buf.put_u8(EVENT_ENCODING_VERSION);
        buf.put_u8(self.event_type.as_u8());

        let mut flags = 0;
        if self.remote {
            flags |= FLAG_REMOTE;
        }
        if self.timestamp.is_some() {
            flags |= FLAG_TIMESTAMP;
        }
        buf.put_u8(flags);
        if let Some(ts) = self.timestamp {
            buf.put_i64_le(ts);
        }

        buf.put_u16_le(name_len);
        buf.put_slice(self.name.as_bytes());

        buf.put_u16_le(meta_count);
        for (k, v) in &self.meta {
            buf.put_u16_le(u16_len("meta key", k.len())?);
            buf.put_slice(k.as_bytes());
            buf.put_u32_le(u32_len("meta value", v.len())?);
            buf.put_slice(v.as_bytes());
        }

        buf.put_u32_le(payload_len);
        buf.put_slice(&self.payload);
        Ok(())
    }

    /// Decode a complete record
    ///
    /// The payload is sliced out of `data` without copying.
    pub fn decode(data: Bytes) -> Result<Self> {
        let total = data.len();
        let mut buf = data;

        need(&buf, 3, total)?;
        let version = buf.get_u8();
        if version != EVENT_ENCODING_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let raw_type = buf.get_u8();
        let event_type =
            EventType::from_u8(raw_type).ok_or(ProtocolError::InvalidEventType(raw_type))?;
        let flags = buf.get_u8();

        let timestamp = if flags & FLAG_TIMESTAMP != 0 {
            need(&buf, 8, total)?;
            Some(buf.get_i64_le())
        } else {
            None
        };

        need(&buf, 2, total)?;
        let name_len = buf.get_u16_le() as usize;
        let name = take_string(&mut buf, name_len, "name", total)?;

        need(&buf, 2, total)?;
        let meta_count = buf.get_u16_le() as usize;
        let mut meta = BTreeMap::new();
        for _ in 0..meta_count {
            need(&buf, 2, total)?;
            let key_len = buf.get_u16_le() as usize;
            let key = take_string(&mut buf, key_len, "meta key", total)?;
            need(&buf, 4, total)?;
            let val_len = buf.get_u32_le() as usize;
            let value = take_string(&mut buf, val_len, "meta value", total)?;
            meta.insert(key, value);
        }

        need(&buf, 4, total)?;
        let payload_len = buf.get_u32_le() as usize;
        need(&buf, payload_len, total)?;
        let payload = buf.split_to(payload_len);

        Ok(Self {
            name,
            event_type,
            timestamp,
            remote: flags & FLAG_REMOTE != 0,
            meta,
            payload,
        })
    }
}

#[inline]
fn need(buf: &Bytes, n: usize, total: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(ProtocolError::too_short(total - buf.remaining() + n, total));
    }
    Ok(())
}

fn take_string(buf: &mut Bytes, len: usize, field: &'static str, total: usize) -> Result<String> {
    need(buf, len, total)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(field))
}

fn u16_len(field: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| ProtocolError::FieldTooLong { field, len })
}

fn u32_len(field: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| ProtocolError::FieldTooLong { field, len })
}
