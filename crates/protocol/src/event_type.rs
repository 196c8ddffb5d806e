//! Event type tags
//!
//! The type tag decides which forwarder an event is dispatched to and which
//! receiver claims it on ingress.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Type tag carried by every event
///
/// NOTE: These values are persisted in queue records and sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EventType {
    /// Distributed trace segment
    Segment = 1,
    /// Meter (metrics) data
    Meter = 2,
    /// Log entry
    Log = 3,
    /// Instance management (heartbeat, properties)
    Management = 4,
    /// Profiling snapshot
    Profile = 5,
    /// Platform event
    Event = 6,
    /// Configuration-sync request (request/response)
    ConfigSync = 7,
    /// Access log entry
    AccessLog = 8,
}

impl EventType {
    /// All known event types, in tag order
    pub const ALL: [EventType; 8] = [
        Self::Segment,
        Self::Meter,
        Self::Log,
        Self::Management,
        Self::Profile,
        Self::Event,
        Self::ConfigSync,
        Self::AccessLog,
    ];

    /// Parse event type from raw byte value
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Segment),
            2 => Some(Self::Meter),
            3 => Some(Self::Log),
            4 => Some(Self::Management),
            5 => Some(Self::Profile),
            6 => Some(Self::Event),
            7 => Some(Self::ConfigSync),
            8 => Some(Self::AccessLog),
            _ => None,
        }
    }

    /// Convert to raw byte value
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this type uses the request/response path instead of the queue
    #[inline]
    pub const fn is_sync(self) -> bool {
        matches!(self, Self::ConfigSync)
    }

    /// Get the string name of this event type
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Segment => "segment",
            Self::Meter => "meter",
            Self::Log => "log",
            Self::Management => "management",
            Self::Profile => "profile",
            Self::Event => "event",
            Self::ConfigSync => "config_sync",
            Self::AccessLog => "access_log",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownEventType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_matches_as_u8() {
        for t in EventType::ALL {
            assert_eq!(EventType::from_u8(t.as_u8()), Some(t));
        }
        assert_eq!(EventType::from_u8(0), None);
        assert_eq!(EventType::from_u8(200), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("meter".parse::<EventType>().unwrap(), EventType::Meter);
        assert_eq!("ACCESS_LOG".parse::<EventType>().unwrap(), EventType::AccessLog);
        assert!("bogus".parse::<EventType>().is_err());
    }

    #[test]
    fn test_only_config_sync_is_sync() {
        let sync: Vec<_> = EventType::ALL.into_iter().filter(|t| t.is_sync()).collect();
        assert_eq!(sync, vec![EventType::ConfigSync]);
    }
}
