//! Infrastructure layer for the relay server.
//!
//! Everything that touches the outside world lives here: the TCP listener,
//! the socket-level frame reader and writer, and the TOML config file.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener and accepting NFC endpoint connections
//! - Reading inbound frames from a socket (`frame_io::FramedReader`)
//! - Draining each connection's outbound queue into its socket
//! - Spawning per-connection Tokio tasks
//! - Loading the optional config file
//!
//! # What does NOT belong here?
//!
//! - Session membership, filtering or plugin logic (that is the application layer)
//! - Command-line parsing (that is done in `main.rs`)

pub mod config_file;
pub mod frame_io;
pub mod server;

pub use config_file::{load_config, ConfigError, ConfigFile};
pub use frame_io::{run_writer, FramedReader};
pub use server::RelayServer;
