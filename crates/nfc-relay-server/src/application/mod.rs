//! Application layer for the relay server.
//!
//! The application layer knows *what* the relay does with a frame: which
//! session it belongs to, how it is rewritten, and who receives it.  It reads
//! frames through the [`FrameSource`] trait and delivers them through bounded
//! channels, so none of it touches a socket directly.
//!
//! # Responsibilities
//!
//! - The per-connection state machine (`connection`)
//! - Session membership and broadcast (`registry`)
//! - The ordered plugin pipeline (`pipeline`) and its catalog (`plugins`)
//!
//! # What does NOT belong here?
//!
//! - Binding or accepting TCP connections (that is infrastructure)
//! - Reading config files or parsing the command line

pub mod connection;
pub mod pipeline;
pub mod plugins;
pub mod registry;

pub use connection::{ConnectionError, ConnectionHandler, FrameReadError, FrameSource, RelayContext};
pub use pipeline::{FnPlugin, PipelineError, Plugin, PluginError, PluginLog, PluginPipeline};
pub use plugins::{build_pipeline, CatalogError};
pub use registry::{BroadcastReport, OutboundFrame, PeerHandle, SessionRegistry};
