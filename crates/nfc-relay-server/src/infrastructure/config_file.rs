//! TOML configuration file for the relay.
//!
//! Every field is optional; anything missing falls back to the same default
//! as [`RelayConfig::default`].  Example:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 5566
//! idle_timeout_secs = 300
//! peer_write_timeout_secs = 5
//! peer_queue_depth = 64
//! max_frame_len = 16777216
//! log_level = "info"
//!
//! [plugins]
//! enabled = ["log"]
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so an empty file is a valid
//! configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nfc_relay_core::protocol::MAX_FRAME_LEN;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::{RelayConfig, DEFAULT_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    /// A value is syntactically fine but unusable.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ── File schema ───────────────────────────────────────────────────────────────

/// Top-level file layout.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub plugins: PluginsSection,
}

/// Listener, timeout and logging settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_peer_write_timeout_secs")]
    pub peer_write_timeout_secs: u64,
    #[serde(default = "default_peer_queue_depth")]
    pub peer_queue_depth: usize,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u32,
    /// `tracing` filter directive, e.g. `"info"` or `"nfc_relay_server=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Plugins to load, in application order.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PluginsSection {
    #[serde(default)]
    pub enabled: Vec<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_idle_timeout_secs() -> u64 {
    300
}
fn default_peer_write_timeout_secs() -> u64 {
    5
}
fn default_peer_queue_depth() -> usize {
    64
}
fn default_max_frame_len() -> u32 {
    MAX_FRAME_LEN
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            idle_timeout_secs: default_idle_timeout_secs(),
            peer_write_timeout_secs: default_peer_write_timeout_secs(),
            peer_queue_depth: default_peer_queue_depth(),
            max_frame_len: default_max_frame_len(),
            log_level: default_log_level(),
        }
    }
}

impl ConfigFile {
    /// Parses a config file from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Converts the file contents into a validated [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] or
    /// [`ConfigError::InvalidValue`] for unusable values.
    pub fn into_relay_config(self) -> Result<RelayConfig, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind_address.clone()))?;

        if self.server.peer_queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "peer_queue_depth",
                reason: "must be at least 1".into(),
            });
        }
        if self.server.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "idle_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.server.peer_write_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "peer_write_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.server.max_frame_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_frame_len",
                reason: "must be at least 1".into(),
            });
        }

        Ok(RelayConfig {
            bind_addr: SocketAddr::new(ip, self.server.port),
            idle_timeout: Duration::from_secs(self.server.idle_timeout_secs),
            peer_write_timeout: Duration::from_secs(self.server.peer_write_timeout_secs),
            peer_queue_depth: self.server.peer_queue_depth,
            max_frame_len: self.server.max_frame_len.min(MAX_FRAME_LEN),
            plugins: self.plugins.enabled,
        })
    }
}

/// Loads a config file from `path`.
///
/// Unlike a per-user settings file, an explicitly named config file that does
/// not exist is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigFile::from_toml_str(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        // Arrange / Act
        let cfg = ConfigFile::from_toml_str("").unwrap().into_relay_config().unwrap();

        // Assert
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn test_partial_server_section_keeps_other_defaults() {
        let file = ConfigFile::from_toml_str("[server]\nport = 6000\n").unwrap();

        assert_eq!(file.server.port, 6000);
        assert_eq!(file.server.idle_timeout_secs, 300);
        assert_eq!(file.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_full_file_maps_onto_relay_config() {
        let toml = r#"
            [server]
            bind_address = "127.0.0.1"
            port = 7000
            idle_timeout_secs = 30
            peer_write_timeout_secs = 2
            peer_queue_depth = 8
            max_frame_len = 4096
            log_level = "debug"

            [plugins]
            enabled = ["log", "passthrough"]
        "#;

        let cfg = ConfigFile::from_toml_str(toml).unwrap().into_relay_config().unwrap();

        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:7000");
        assert_eq!(cfg.idle_timeout, Duration::from_secs(30));
        assert_eq!(cfg.peer_write_timeout, Duration::from_secs(2));
        assert_eq!(cfg.peer_queue_depth, 8);
        assert_eq!(cfg.max_frame_len, 4096);
        assert_eq!(cfg.plugins, vec!["log".to_string(), "passthrough".to_string()]);
    }

    #[test]
    fn test_max_frame_len_is_capped_at_codec_ceiling() {
        let file = ConfigFile {
            server: ServerSection {
                max_frame_len: u32::MAX,
                ..ServerSection::default()
            },
            ..ConfigFile::default()
        };

        let cfg = file.into_relay_config().unwrap();

        assert_eq!(cfg.max_frame_len, MAX_FRAME_LEN);
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let file = ConfigFile::from_toml_str("[server]\nbind_address = \"not.an.ip\"\n").unwrap();

        let err = file.into_relay_config().unwrap_err();

        assert!(matches!(err, ConfigError::InvalidBindAddress(addr) if addr == "not.an.ip"));
    }

    #[test]
    fn test_zero_queue_depth_is_rejected() {
        let file = ConfigFile::from_toml_str("[server]\npeer_queue_depth = 0\n").unwrap();
        assert!(matches!(
            file.into_relay_config(),
            Err(ConfigError::InvalidValue { field: "peer_queue_depth", .. })
        ));
    }

    #[test]
    fn test_zero_write_timeout_is_rejected() {
        let file = ConfigFile::from_toml_str("[server]\npeer_write_timeout_secs = 0\n").unwrap();
        assert!(matches!(
            file.into_relay_config(),
            Err(ConfigError::InvalidValue { field: "peer_write_timeout_secs", .. })
        ));
    }

    #[test]
    fn test_zero_max_frame_len_is_rejected() {
        let file = ConfigFile::from_toml_str("[server]\nmax_frame_len = 0\n").unwrap();
        assert!(matches!(
            file.into_relay_config(),
            Err(ConfigError::InvalidValue { field: "max_frame_len", .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = ConfigFile::from_toml_str("[server\nport = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = load_config(Path::new("/nonexistent/nfc-relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
