//! TCP relay server: accept loop and per-connection task wiring.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming connections from NFC endpoints.
//! 3. Giving each connection a bounded outbound queue and a writer task that
//!    drains it into the socket.
//! 4. Running a [`ConnectionHandler`] per connection over a [`FramedReader`].
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Concurrency
//!
//! Every connection gets two Tokio tasks: the handler (reads, filters,
//! broadcasts) and the writer (drains the queue).  Broadcasting only enqueues,
//! so a slow peer delays nobody but itself.  The [`SessionRegistry`] and the
//! [`PluginPipeline`] are shared between all handlers through `Arc`.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::connection::{ConnectionHandler, RelayContext};
use crate::application::pipeline::PluginPipeline;
use crate::application::registry::{PeerHandle, SessionRegistry};
use crate::domain::config::RelayConfig;
use crate::domain::connection::ConnectionId;
use crate::infrastructure::frame_io::{run_writer, FramedReader};

/// How often the accept loop wakes up to check the `running` flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A bound relay listener plus the state its connections share.
pub struct RelayServer {
    listener: TcpListener,
    config: Arc<RelayConfig>,
    registry: Arc<SessionRegistry>,
    pipeline: Arc<PluginPipeline>,
}

impl RelayServer {
    /// Binds the listener on `config.bind_addr`.
    ///
    /// Binding happens here rather than in [`run`](Self::run) so callers can
    /// bind port 0 and read the chosen port from [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// Returns an error if the port is in use or the process lacks permission
    /// to bind.
    pub async fn bind(config: RelayConfig, pipeline: PluginPipeline) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind relay listener on {}", config.bind_addr))?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            pipeline: Arc::new(pipeline),
        })
    }

    /// The address actually bound.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry shared by every connection of this server.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Runs the accept loop until `running` is set to `false`.
    ///
    /// Connections that are already open keep running after the loop stops;
    /// they end on their own through end of stream or the idle timeout.
    pub async fn run(self, running: Arc<AtomicBool>) {
        match self.listener.local_addr() {
            Ok(addr) => info!(
                tag = "server",
                origin = "server",
                plugins = ?self.pipeline.names().collect::<Vec<_>>(),
                "relay listening on {addr}"
            ),
            Err(e) => warn!(tag = "server", origin = "server", "listening on unknown address: {e}"),
        }

        loop {
            if !running.load(Ordering::Relaxed) {
                info!(tag = "server", origin = "server", "shutdown flag set; stopping accept loop");
                break;
            }

            match timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => self.spawn_connection(stream, peer_addr),
                Ok(Err(e)) => {
                    // Transient (e.g. too many open files); keep serving.
                    error!(tag = "server", origin = "server", "accept error: {e}");
                }
                Err(_) => {}
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(tag = "server", origin = %peer_addr, "set_nodelay failed: {e}");
        }

        let (read_half, write_half) = stream.into_split();
        let (outbox, queue) = mpsc::channel(self.config.peer_queue_depth);

        tokio::spawn(run_writer(
            write_half,
            queue,
            self.config.peer_write_timeout,
            peer_addr.to_string(),
        ));

        let peer = PeerHandle::new(ConnectionId::new(), peer_addr, outbox);
        let ctx = RelayContext::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.pipeline),
            &self.config,
        );
        let source = FramedReader::new(read_half, self.config.max_frame_len);

        tokio::spawn(async move {
            match ConnectionHandler::new(peer, ctx).run(source).await {
                Ok(reason) => info!(tag = "server", origin = %peer_addr, "closed: {reason}"),
                Err(e) => warn!(tag = "server", origin = %peer_addr, "closed with error: {e}"),
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn loopback_config() -> RelayConfig {
        RelayConfig {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_port_zero_reports_assigned_port() {
        // Arrange / Act
        let server = RelayServer::bind(loopback_config(), PluginPipeline::new())
            .await
            .unwrap();

        // Assert
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        // Arrange
        let first = RelayServer::bind(loopback_config(), PluginPipeline::new())
            .await
            .unwrap();
        let taken = RelayConfig {
            bind_addr: first.local_addr().unwrap(),
            ..RelayConfig::default()
        };

        // Act
        let second = RelayServer::bind(taken, PluginPipeline::new()).await;

        // Assert
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_run_returns_once_flag_cleared() {
        let server = RelayServer::bind(loopback_config(), PluginPipeline::new())
            .await
            .unwrap();
        let running = Arc::new(AtomicBool::new(false));

        let result = tokio::time::timeout(Duration::from_secs(2), server.run(running)).await;

        assert!(result.is_ok(), "accept loop must stop when the flag is cleared");
    }
}
