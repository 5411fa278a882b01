//! The plugin pipeline: ordered, externally supplied payload transforms.
//!
//! After the built-in field mutation pass, every frame is handed to each
//! registered plugin in turn.  Each plugin receives the payload produced by
//! the previous one and returns the payload for the next; the last result is
//! what gets broadcast.
//!
//! ```text
//! filtered payload ─► plugin 1 ─► plugin 2 ─► … ─► plugin N ─► broadcast
//! ```
//!
//! Registration order is significant and is preserved exactly.
//!
//! # Failure handling
//!
//! A plugin that returns an error aborts the whole pipeline for that frame.
//! The error is surfaced to the caller as a [`PipelineError`] naming the
//! plugin.  [`PluginError::Rejected`] means "drop this frame";
//! [`PluginError::Corrupted`] means the plugin can no longer be trusted and
//! the connection should be closed.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

/// Errors a plugin may report for one frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    /// The frame should not be relayed; the connection carries on.
    #[error("frame rejected: {0}")]
    Rejected(String),

    /// The plugin's internal state is broken; the connection must close.
    #[error("plugin state corrupted: {0}")]
    Corrupted(String),
}

/// A plugin failure, tagged with the plugin that raised it.
#[derive(Debug, Error)]
#[error("plugin '{plugin}' failed: {source}")]
pub struct PipelineError {
    /// Name the failing plugin was registered under.
    pub plugin: Arc<str>,
    /// What the plugin reported.
    #[source]
    pub source: PluginError,
}

impl PipelineError {
    /// Returns `true` if the connection that produced the frame must close.
    pub fn is_fatal(&self) -> bool {
        matches!(self.source, PluginError::Corrupted(_))
    }
}

/// Logging sink handed to a plugin, pre-bound to the plugin's name (the tag)
/// and the connection's peer address (the origin).
///
/// Events go through `tracing`, so the subscriber supplies the timestamp.
#[derive(Debug, Clone)]
pub struct PluginLog {
    tag: Arc<str>,
    origin: Arc<str>,
}

impl PluginLog {
    pub fn new(tag: Arc<str>, origin: Arc<str>) -> Self {
        Self { tag, origin }
    }

    /// The plugin name this sink is bound to.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The peer address this sink is bound to.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Emits an `info` event.
    pub fn log(&self, message: impl fmt::Display) {
        info!(tag = %self.tag, origin = %self.origin, "{message}");
    }

    /// Emits a `debug` event.
    pub fn debug(&self, message: impl fmt::Display) {
        debug!(tag = %self.tag, origin = %self.origin, "{message}");
    }
}

/// One payload transform.
///
/// Implementations may keep state (behind their own synchronisation, since
/// one instance is shared by every connection) and may return the payload
/// unchanged.
#[cfg_attr(test, mockall::automock)]
pub trait Plugin: Send + Sync {
    /// Transforms `payload` and returns the bytes to pass on.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] to drop the frame or close the connection.
    fn handle_data(&self, log: &PluginLog, payload: Vec<u8>) -> Result<Vec<u8>, PluginError>;
}

/// A [`Plugin`] backed by a closure.
///
/// Handy for embedding the relay as a library and for tests.
///
/// # Example
///
/// ```rust
/// use nfc_relay_server::application::pipeline::{FnPlugin, PluginPipeline};
///
/// let pipeline = PluginPipeline::new()
///     .with_plugin("append-1", FnPlugin::new(|_, mut p| { p.push(1); Ok(p) }))
///     .with_plugin("append-2", FnPlugin::new(|_, mut p| { p.push(2); Ok(p) }));
///
/// let out = pipeline.apply(&"test".into(), Vec::new()).unwrap();
/// assert_eq!(out, vec![1, 2]);
/// ```
pub struct FnPlugin<F>(F);

impl<F> FnPlugin<F>
where
    F: Fn(&PluginLog, Vec<u8>) -> Result<Vec<u8>, PluginError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&PluginLog, Vec<u8>) -> Result<Vec<u8>, PluginError> + Send + Sync,
{
    fn handle_data(&self, log: &PluginLog, payload: Vec<u8>) -> Result<Vec<u8>, PluginError> {
        (self.0)(log, payload)
    }
}

/// An ordered list of `(name, plugin)` pairs, fixed once the relay starts.
#[derive(Default)]
pub struct PluginPipeline {
    stages: Vec<(Arc<str>, Box<dyn Plugin>)>,
}

impl PluginPipeline {
    /// Creates an empty pipeline, which returns every payload unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plugin and returns the pipeline (builder style).
    pub fn with_plugin(mut self, name: impl Into<Arc<str>>, plugin: impl Plugin + 'static) -> Self {
        self.push(name, Box::new(plugin));
        self
    }

    /// Appends a boxed plugin after all previously registered ones.
    pub fn push(&mut self, name: impl Into<Arc<str>>, plugin: Box<dyn Plugin>) {
        self.stages.push((name.into(), plugin));
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Registered plugin names, in application order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|(name, _)| name.as_ref())
    }

    /// Folds `payload` through every plugin in registration order.
    ///
    /// `origin` is the peer address the frame came from; each plugin gets a
    /// [`PluginLog`] bound to that origin and to its own name.
    ///
    /// # Errors
    ///
    /// Returns the first plugin failure; later plugins are not called.
    pub fn apply(&self, origin: &Arc<str>, payload: Vec<u8>) -> Result<Vec<u8>, PipelineError> {
        self.stages
            .iter()
            .try_fold(payload, |payload, (name, plugin)| {
                let log = PluginLog::new(Arc::clone(name), Arc::clone(origin));
                plugin
                    .handle_data(&log, payload)
                    .map_err(|source| PipelineError {
                        plugin: Arc::clone(name),
                        source,
                    })
            })
    }
}

impl fmt::Debug for PluginPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
