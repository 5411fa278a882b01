//! nfc-relay-server library crate.
//!
//! A TCP relay that groups connected NFC endpoints into numbered sessions and
//! forwards every frame one member sends to all other members of the same
//! session, after passing it through a field mutation filter and a
//! configurable plugin pipeline.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! NFC endpoints (length-prefixed frames over TCP)
//!         ↕
//! [nfc-relay-server]
//!   ├── domain/           Pure types: RelayConfig, ConnectionState, CloseReason
//!   ├── application/      Connection state machine, session registry, plugins
//!   └── infrastructure/
//!         ├── server/     TCP accept loop, per-connection tasks
//!         ├── frame_io/   Socket frame reader and queue writer
//!         └── config_file/ Optional TOML configuration
//! ```
//!
//! The wire codec and the field mutation filter live in `nfc-relay-core`,
//! which has no async or I/O dependencies.
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `nfc-relay-core`; it reaches the
//!   network only through the `FrameSource` trait and `mpsc` queues.
//! - `infrastructure` depends on all other layers plus `tokio::net`.

/// Domain layer: configuration and connection state types (no I/O).
pub mod domain;

/// Application layer: relay state machine, registry and plugin pipeline.
pub mod application;

/// Infrastructure layer: TCP server, socket framing and config file.
pub mod infrastructure;
