//! Session identifiers.
//!
//! A session is a group of connections that relay frames to each other.  On
//! the wire it is a single unsigned byte, so there are at most 255 usable
//! sessions per relay.  The value `0` is reserved: it means "no session
//! selected yet" when a client first connects, and "leave the current
//! session" once one has been joined.
//!
//! Identifiers are opaque.  They have no ordering semantics; `Ord` is not
//! derived on purpose.

use std::fmt;

/// An 8-bit session identifier as carried in the inbound frame header.
///
/// # Examples
///
/// ```rust
/// use nfc_relay_core::SessionId;
///
/// assert!(SessionId::NONE.is_none());
/// assert!(!SessionId::new(7).is_none());
/// assert_eq!(SessionId::from(7u8), SessionId::new(7));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u8);

impl SessionId {
    /// The reserved "no session" value.
    pub const NONE: SessionId = SessionId(0);

    /// Wraps a raw wire byte.
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the raw wire byte.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns `true` for the reserved value `0`.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<u8> for SessionId {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl From<SessionId> for u8 {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_the_reserved_none_value() {
        assert_eq!(SessionId::new(0), SessionId::NONE);
        assert!(SessionId::new(0).is_none());
    }

    #[test]
    fn test_every_non_zero_byte_is_a_real_session() {
        for raw in 1..=u8::MAX {
            assert!(!SessionId::new(raw).is_none(), "{raw} must not be none");
        }
    }

    #[test]
    fn test_raw_byte_conversion_is_lossless() {
        let id = SessionId::from(200u8);
        assert_eq!(u8::from(id), 200);
        assert_eq!(id.get(), 200);
    }

    #[test]
    fn test_display_prints_the_decimal_value() {
        assert_eq!(SessionId::new(42).to_string(), "42");
    }
}
