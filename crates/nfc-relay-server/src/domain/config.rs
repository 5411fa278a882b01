//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from (in increasing precedence) the defaults,
//! an optional TOML file, and the command line, then shared read-only with
//! every connection task.

use std::net::SocketAddr;
use std::time::Duration;

use nfc_relay_core::protocol::MAX_FRAME_LEN;

/// Port the relay has always listened on.
pub const DEFAULT_PORT: u16 = 5566;

/// All runtime configuration for the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Address and port the TCP listener binds to.
    pub bind_addr: SocketAddr,

    /// How long a connection may stay silent before it is closed.
    pub idle_timeout: Duration,

    /// Upper bound on a single socket write to a peer.  A peer that cannot
    /// absorb a frame within this window is dropped from delivery.
    pub peer_write_timeout: Duration,

    /// Number of encoded frames that may wait in a peer's outbound queue.
    /// A broadcast that finds the queue full skips that peer.
    pub peer_queue_depth: usize,

    /// Largest payload a client may declare in a frame header.
    pub max_frame_len: u32,

    /// Plugin names, in the order they are applied to every frame.
    pub plugins: Vec<String>,
}

impl Default for RelayConfig {
    /// | Field              | Default         |
    /// |--------------------|-----------------|
    /// | bind_addr          | `0.0.0.0:5566`  |
    /// | idle_timeout       | 300 seconds     |
    /// | peer_write_timeout | 5 seconds       |
    /// | peer_queue_depth   | 64 frames       |
    /// | max_frame_len      | 16 MiB          |
    /// | plugins            | none            |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(300),
            peer_write_timeout: Duration::from_secs(5),
            peer_queue_depth: 64,
            max_frame_len: MAX_FRAME_LEN,
            plugins: Vec::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listens_on_all_interfaces_port_5566() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:5566");
    }

    #[test]
    fn test_default_idle_timeout_is_300s() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_default_has_no_plugins() {
        assert!(RelayConfig::default().plugins.is_empty());
    }

    #[test]
    fn test_default_frame_ceiling_matches_codec() {
        assert_eq!(RelayConfig::default().max_frame_len, MAX_FRAME_LEN);
    }
}
