//! ConnectionHandler: the per-connection relay state machine.
//!
//! One handler owns one accepted connection for its whole life.  It reads
//! frames, keeps track of which session the connection belongs to, runs the
//! field mutation filter and the plugin pipeline, and asks the
//! [`SessionRegistry`] to broadcast the result.
//!
//! # The read loop
//!
//! ```text
//! ┌─► read frame (idle timeout) ── end of stream / timeout ──────────► close
//! │       │
//! │       ├── length 0 ───────────────────────────────────────────────► close
//! │       ├── session 0 while Connected ──────────────────────────────► close
//! │       ├── session differs from current → leave old, join new
//! │       ├── field mutation filter
//! │       ├── plugin pipeline ── rejected → drop frame ───────────────┐
//! │       │                   └─ corrupted ───────────────────────────┼► close
//! │       └── broadcast to every other member                         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Whichever way the loop ends, [`ConnectionHandler::run`] performs exactly
//! one `leave` for the current session afterwards.  For a connection that
//! never joined, that leave is a no-op.  If the handler is dropped before
//! `run` gets that far (a plugin panicked, or the task was aborted), its
//! `Drop` impl spawns the same `leave`, so a dead connection never lingers in
//! a session.
//!
//! # Testability
//!
//! The handler reads through the [`FrameSource`] trait rather than a socket,
//! so tests drive it with scripted frames.  The TCP implementation lives in
//! `infrastructure::frame_io`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nfc_relay_core::{FieldMutationFilter, InboundFrame, MutationOutcome, ProtocolError, SessionId};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::application::pipeline::{PipelineError, PluginPipeline};
use crate::application::registry::{PeerHandle, SessionRegistry};
use crate::domain::config::RelayConfig;
use crate::domain::connection::{CloseReason, ConnectionState};

/// Errors a [`FrameSource`] may report.
#[derive(Debug, Error)]
pub enum FrameReadError {
    /// The stream ended before a complete header or payload arrived.
    #[error("end of stream")]
    EndOfStream,

    /// The header was well-formed but unacceptable (e.g. too large).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a connection abnormally.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Anything that yields complete inbound frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next complete frame.
    async fn next_frame(&mut self) -> Result<InboundFrame, FrameReadError>;
}

/// Shared, read-only collaborators every handler needs.
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub registry: Arc<SessionRegistry>,
    pub pipeline: Arc<PluginPipeline>,
    pub idle_timeout: Duration,
}

impl RelayContext {
    pub fn new(
        registry: Arc<SessionRegistry>,
        pipeline: Arc<PluginPipeline>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            registry,
            pipeline,
            idle_timeout: config.idle_timeout,
        }
    }
}

/// The relay state machine for one connection.
pub struct ConnectionHandler {
    peer: PeerHandle,
    origin: Arc<str>,
    state: ConnectionState,
    filter: FieldMutationFilter,
    ctx: RelayContext,
}

impl ConnectionHandler {
    /// Creates a handler in the `Connected` state.
    ///
    /// `peer` is the handle other connections use to reach this one; the
    /// handler registers it with the registry when a session is joined.
    pub fn new(peer: PeerHandle, ctx: RelayContext) -> Self {
        let origin = Arc::from(peer.addr().to_string());
        Self {
            peer,
            origin,
            state: ConnectionState::Connected,
            filter: FieldMutationFilter::new(),
            ctx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer.addr()
    }

    /// Runs the read loop to completion, then leaves the current session.
    ///
    /// Returns the clean close reason, or the error that ended the
    /// connection.  Either way the connection is out of the registry when
    /// this returns.
    pub async fn run<S: FrameSource>(mut self, mut source: S) -> Result<CloseReason, ConnectionError> {
        info!(tag = "server", origin = %self.origin, "connected");

        let outcome = self.read_loop(&mut source).await;

        self.ctx
            .registry
            .leave(self.current_session(), self.peer.id())
            .await;
        self.state = ConnectionState::Closed;

        info!(tag = "server", origin = %self.origin, "disconnected");
        outcome
    }

    async fn read_loop<S: FrameSource>(&mut self, source: &mut S) -> Result<CloseReason, ConnectionError> {
        loop {
            let frame = match timeout(self.ctx.idle_timeout, source.next_frame()).await {
                Err(_elapsed) => return Ok(CloseReason::IdleTimeout),
                Ok(Err(FrameReadError::EndOfStream)) => return Ok(CloseReason::EndOfStream),
                Ok(Err(FrameReadError::Protocol(e))) => return Err(e.into()),
                Ok(Err(FrameReadError::Io(e))) => return Err(e.into()),
                Ok(Ok(frame)) => frame,
            };

            debug!(
                tag = "server",
                origin = %self.origin,
                "data: session={} len={}", frame.session, frame.payload.len()
            );

            if frame.is_empty() {
                return Ok(CloseReason::EmptyFrame);
            }
            if frame.session.is_none() && self.state == ConnectionState::Connected {
                return Ok(CloseReason::DisconnectRequested);
            }

            self.switch_session(frame.session).await;
            self.relay(frame.payload).await?;
        }
    }

    /// The session to leave or broadcast to; the reserved value when none.
    fn current_session(&self) -> SessionId {
        self.state.session().unwrap_or(SessionId::NONE)
    }

    /// Leaves the current session and joins `declared` if they differ.
    async fn switch_session(&mut self, declared: SessionId) {
        if self.state == ConnectionState::Joined(declared) {
            return;
        }

        self.ctx
            .registry
            .leave(self.current_session(), self.peer.id())
            .await;
        self.state = ConnectionState::Joined(declared);
        self.ctx.registry.join(declared, self.peer.clone()).await;
    }

    /// Filters, transforms and broadcasts one payload.
    ///
    /// A rejected frame is dropped and the connection carries on; only a
    /// corrupted pipeline is returned as an error.
    async fn relay(&mut self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        let (filtered, outcome) = self.filter.apply(&payload);
        self.log_mutation(outcome);

        let outbound = match self.ctx.pipeline.apply(&self.origin, filtered) {
            Ok(outbound) => outbound,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(tag = %e.plugin, origin = %self.origin, "frame dropped: {e}");
                return Ok(());
            }
        };

        let session = self.current_session();
        match self
            .ctx
            .registry
            .broadcast(session, &outbound, self.peer.id())
            .await
        {
            Ok(report) if report.skipped > 0 => {
                debug!(
                    tag = "server",
                    origin = %self.origin,
                    "session {session}: {} peer(s) skipped", report.skipped
                );
            }
            Ok(_) => {}
            Err(e) => warn!(tag = "server", origin = %self.origin, "frame dropped: {e}"),
        }
        Ok(())
    }

    fn log_mutation(&self, outcome: MutationOutcome) {
        match outcome {
            MutationOutcome::Unchanged => {}
            MutationOutcome::TtqDetected { offset } => {
                info!(tag = "filter", origin = %self.origin, "TTQ detected at {offset}");
            }
            MutationOutcome::GpoBitCleared { offset } => {
                info!(tag = "filter", origin = %self.origin, "GET PROCESSING OPTIONS modified at {offset}");
            }
            MutationOutcome::CtqBitFlipped { offset } => {
                info!(tag = "filter", origin = %self.origin, "CTQ modified at {offset}");
            }
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        let session = self.current_session();
        if session.is_none() {
            return;
        }
        // Runtime already gone: the registry goes with it.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let registry = Arc::clone(&self.ctx.registry);
        let id = self.peer.id();
        let origin = Arc::clone(&self.origin);
        runtime.spawn(async move {
            if registry.leave(session, id).await {
                warn!(tag = "server", origin = %origin, "handler ended abnormally; removed from session {session}");
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
