//! SessionRegistry: which connections are joined to which session.
//!
//! The registry is the only state shared between connection tasks.  Every
//! `join`, `leave` and `broadcast` runs under one `tokio::sync::Mutex`, so a
//! broadcast always iterates a consistent membership snapshot and a
//! connection can never be observed in two sessions at once (as long as its
//! handler leaves before it joins, which [`ConnectionHandler`] guarantees).
//!
//! # Delivery model
//!
//! Members are stored as [`PeerHandle`]s.  A handle does not own the peer's
//! socket; it holds the sending side of that peer's bounded outbound queue.
//! A broadcast encodes the frame once and `try_send`s it into each queue,
//! which never waits.  A peer whose queue is full (it is not reading fast
//! enough) or closed (its writer died) is logged and skipped; delivery to
//! the other peers carries on.  The slow peer's own read loop will notice its
//! transport failure and clean up.
//!
//! [`ConnectionHandler`]: crate::application::connection::ConnectionHandler

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use nfc_relay_core::{encode_outbound, ProtocolError, SessionId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::connection::ConnectionId;

/// An encoded relay → client frame, shared by every recipient of a broadcast.
pub type OutboundFrame = Arc<[u8]>;

/// The registry's reference to one connection.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    addr: SocketAddr,
    outbox: mpsc::Sender<OutboundFrame>,
}

impl PeerHandle {
    pub fn new(id: ConnectionId, addr: SocketAddr, outbox: mpsc::Sender<OutboundFrame>) -> Self {
        Self { id, addr, outbox }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers whose queue accepted the frame.
    pub delivered: usize,
    /// Peers skipped because their queue was full or closed.
    pub skipped: usize,
}

/// Session id → ordered list of joined peers.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Vec<PeerHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `peer` to `session`, creating the session if needed.
    ///
    /// No-op for the reserved session `0`.  Always appends; it never replaces
    /// an existing entry.
    pub async fn join(&self, session: SessionId, peer: PeerHandle) {
        if session.is_none() {
            return;
        }

        let origin = peer.addr;
        let mut sessions = self.sessions.lock().await;
        let members = sessions.entry(session).or_default();
        members.push(peer);
        info!(tag = "server", %origin, "joined session {session} ({} member(s))", members.len());
    }

    /// Removes connection `id` from `session`.
    ///
    /// No-op for the reserved session `0`, for an unknown session, and for a
    /// connection that is not a member.  Returns `true` if something was
    /// removed.  A session whose last member leaves is dropped.
    pub async fn leave(&self, session: SessionId, id: ConnectionId) -> bool {
        if session.is_none() {
            return false;
        }

        let mut sessions = self.sessions.lock().await;
        let Some(members) = sessions.get_mut(&session) else {
            return false;
        };

        let before = members.len();
        let origin = members.iter().find(|p| p.id == id).map(|p| p.addr);
        members.retain(|p| p.id != id);
        let removed = members.len() != before;
        if members.is_empty() {
            sessions.remove(&session);
        }

        if let Some(origin) = origin {
            info!(tag = "server", %origin, "left session {session}");
        }
        removed
    }

    /// Sends `payload` to every member of `session` except `origin`.
    ///
    /// No-op (empty report) for the reserved session `0` and for an unknown
    /// session.  Queue failures are logged and counted, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] if `payload` cannot be framed;
    /// nothing is sent in that case.
    pub async fn broadcast(
        &self,
        session: SessionId,
        payload: &[u8],
        origin: ConnectionId,
    ) -> Result<BroadcastReport, ProtocolError> {
        if session.is_none() {
            return Ok(BroadcastReport::default());
        }

        let frame: OutboundFrame = encode_outbound(payload)?.into();
        let mut report = BroadcastReport::default();

        let sessions = self.sessions.lock().await;
        let Some(members) = sessions.get(&session) else {
            return Ok(report);
        };

        for peer in members.iter().filter(|p| p.id != origin) {
            match peer.outbox.try_send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(tag = "server", origin = %peer.addr, "outbound queue full; frame skipped");
                    report.skipped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(tag = "server", origin = %peer.addr, "peer writer closed; frame skipped");
                    report.skipped += 1;
                }
            }
        }

        debug!(
            tag = "server",
            origin = "server",
            "publish in session {session} reached {} client(s)", report.delivered
        );
        Ok(report)
    }

    /// Connection ids currently joined to `session`, in join order.
    pub async fn members(&self, session: SessionId) -> Vec<ConnectionId> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&session)
            .map(|members| members.iter().map(|p| p.id).collect())
            .unwrap_or_default()
    }

    /// Every session that lists connection `id`.  At most one entry when
    /// callers leave before they join.
    pub async fn sessions_of(&self, id: ConnectionId) -> Vec<SessionId> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .filter(|(_, members)| members.iter().any(|p| p.id == id))
            .map(|(session, _)| *session)
            .collect()
    }

    /// Number of sessions with at least one member.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
