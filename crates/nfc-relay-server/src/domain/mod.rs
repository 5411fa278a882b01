//! Domain layer for the relay server.
//!
//! Pure types with no I/O: runtime configuration and the identity/state types
//! that describe one relayed connection.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or channel types
//! - File I/O or environment variable reading (see `infrastructure::config_file`)

pub mod config;
pub mod connection;

pub use config::RelayConfig;
pub use connection::{CloseReason, ConnectionId, ConnectionState};
