//! Upstream status codes
//!
//! Carried in error frames and used by the shared client to decide whether
//! a failed call means the upstream is gone.

use std::fmt;

/// Status code attached to an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Unknown = 2,
    InvalidArgument = 3,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Parse from the wire byte; unrecognised values map to `Unknown`
    pub const fn from_u8(value: u8) -> Self {
        match value {
            3 => Self::InvalidArgument,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Codes that flip the shared client into the disconnected state
    pub const fn is_disconnect(self) -> bool {
        matches!(
            self,
            Self::Unavailable
                | Self::PermissionDenied
                | Self::Unauthenticated
                | Self::ResourceExhausted
                | Self::Unknown
        )
    }

    /// Authentication failures, logged separately from transient ones
    pub const fn is_auth(self) -> bool {
        matches!(self, Self::PermissionDenied | Self::Unauthenticated)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid_argument",
            Self::PermissionDenied => "permission_denied",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Unimplemented => "unimplemented",
            Self::Internal => "internal",
            Self::Unavailable => "unavailable",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_codes() {
        assert!(StatusCode::Unavailable.is_disconnect());
        assert!(StatusCode::PermissionDenied.is_disconnect());
        assert!(StatusCode::Unauthenticated.is_disconnect());
        assert!(StatusCode::ResourceExhausted.is_disconnect());
        assert!(StatusCode::Unknown.is_disconnect());
        assert!(!StatusCode::InvalidArgument.is_disconnect());
        assert!(!StatusCode::Internal.is_disconnect());
    }

    #[test]
    fn test_unrecognised_maps_to_unknown() {
        assert_eq!(StatusCode::from_u8(99), StatusCode::Unknown);
        assert_eq!(StatusCode::from_u8(14), StatusCode::Unavailable);
    }
}
