//! Plugin catalog: maps configured plugin names to plugin instances.
//!
//! The relay never loads code by name at runtime.  Every plugin it can run is
//! listed in [`BUILTIN_PLUGINS`] at compile time, and [`build_pipeline`] turns
//! the ordered list of names from the configuration into a
//! [`PluginPipeline`].  An unknown name is a startup error, not a silent skip.
//!
//! | Name          | Effect                                             |
//! |---------------|----------------------------------------------------|
//! | `log`         | Logs every payload as hex under the `log` tag.     |
//! | `passthrough` | Returns the payload unchanged.                     |

use thiserror::Error;

use crate::application::pipeline::{Plugin, PluginError, PluginLog, PluginPipeline};

/// Builds a fresh plugin instance.
pub type PluginConstructor = fn() -> Box<dyn Plugin>;

/// Every plugin the relay can load, by configuration name.
pub const BUILTIN_PLUGINS: &[(&str, PluginConstructor)] = &[
    ("log", new_log_plugin),
    ("passthrough", new_passthrough_plugin),
];

/// Error type for pipeline construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown plugin '{name}' (available: {available})")]
    UnknownPlugin { name: String, available: String },
}

/// Returns the names of all built-in plugins.
pub fn available() -> impl Iterator<Item = &'static str> {
    BUILTIN_PLUGINS.iter().map(|(name, _)| *name)
}

/// Builds a pipeline from plugin names, preserving their order.
///
/// The same name may appear more than once; each occurrence gets its own
/// instance.
///
/// # Errors
///
/// Returns [`CatalogError::UnknownPlugin`] for the first name that is not in
/// [`BUILTIN_PLUGINS`].
pub fn build_pipeline<S: AsRef<str>>(names: &[S]) -> Result<PluginPipeline, CatalogError> {
    let mut pipeline = PluginPipeline::new();
    for name in names {
        let name = name.as_ref();
        let constructor = BUILTIN_PLUGINS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, constructor)| constructor)
            .ok_or_else(|| CatalogError::UnknownPlugin {
                name: name.to_string(),
                available: available().collect::<Vec<_>>().join(", "),
            })?;
        pipeline.push(name, constructor());
    }
    Ok(pipeline)
}

// ── Built-in plugins ──────────────────────────────────────────────────────────

/// Logs each payload as space-separated hex.
pub struct LogPlugin;

impl Plugin for LogPlugin {
    fn handle_data(&self, log: &PluginLog, payload: Vec<u8>) -> Result<Vec<u8>, PluginError> {
        log.log(format_args!("data: {}", hex(&payload)));
        Ok(payload)
    }
}

/// Returns every payload unchanged.
pub struct PassthroughPlugin;

impl Plugin for PassthroughPlugin {
    fn handle_data(&self, _log: &PluginLog, payload: Vec<u8>) -> Result<Vec<u8>, PluginError> {
        Ok(payload)
    }
}

fn new_log_plugin() -> Box<dyn Plugin> {
    Box::new(LogPlugin)
}

fn new_passthrough_plugin() -> Box<dyn Plugin> {
    Box::new(PassthroughPlugin)
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_empty_name_list_builds_empty_pipeline() {
        let pipeline = build_pipeline::<&str>(&[]).unwrap();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_names_are_loaded_in_configured_order() {
        let pipeline = build_pipeline(&["passthrough", "log", "passthrough"]).unwrap();
        assert_eq!(
            pipeline.names().collect::<Vec<_>>(),
            vec!["passthrough", "log", "passthrough"]
        );
    }

    #[test]
    fn test_unknown_name_fails_with_available_list() {
        let err = build_pipeline(&["log", "bogus"]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::UnknownPlugin {
                name: "bogus".into(),
                available: "log, passthrough".into(),
            }
        );
    }

    #[test]
    fn test_builtin_plugins_do_not_modify_payload() {
        // Arrange
        let pipeline = build_pipeline(&["log", "passthrough"]).unwrap();
        let payload = vec![0x9F, 0x66, 0x04, 0x36];

        // Act
        let out = pipeline.apply(&Arc::from("test"), payload.clone()).unwrap();

        // Assert
        assert_eq!(out, payload);
    }

    #[test]
    fn test_hex_formats_lowercase_pairs() {
        assert_eq!(hex(&[0x00, 0xAB, 0x10]), "00 ab 10");
        assert_eq!(hex(&[]), "");
    }
}
