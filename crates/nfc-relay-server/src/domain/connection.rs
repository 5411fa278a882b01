//! Identity and lifecycle types for one relayed connection.
//!
//! # Connection lifecycle
//!
//! ```text
//! Connected ──(frame with session S ≠ 0)──► Joined(S) ──(frame with S')──► Joined(S')
//!     │                                          │
//!     │ end of stream / idle / empty frame /     │ end of stream / idle /
//!     │ session 0                                │ empty frame / fatal error
//!     ▼                                          ▼
//!   Closed ◄─────────────────────────────────────┘
//! ```
//!
//! A frame with session `0` while joined moves the connection to
//! `Joined(0)`: it leaves its session but stays open.  Frames it sends in
//! that state reach nobody.

use std::fmt;

use nfc_relay_core::SessionId;
use uuid::Uuid;

/// Identity of one accepted connection.
///
/// The session registry removes members by this id, never by comparing
/// addresses, so two clients behind the same NAT address stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of the per-connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted; no session declared yet.
    Connected,
    /// Bound to a session (possibly the reserved `0` after an explicit leave).
    Joined(SessionId),
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// The session to leave or broadcast to, or `None` if there is none.
    pub fn session(&self) -> Option<SessionId> {
        match self {
            ConnectionState::Joined(session) if !session.is_none() => Some(*session),
            _ => None,
        }
    }
}

/// Why a connection's read loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the stream or sent a short header/payload.
    EndOfStream,
    /// Nothing arrived within the idle timeout.
    IdleTimeout,
    /// The peer sent a zero-length frame.
    EmptyFrame,
    /// The peer sent session `0` before ever joining a session.
    DisconnectRequested,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::EndOfStream => "end of stream",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::EmptyFrame => "empty frame",
            CloseReason::DisconnectRequested => "disconnect requested",
        };
        f.write_str(text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
