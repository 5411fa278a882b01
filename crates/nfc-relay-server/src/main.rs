//! NFC relay server: entry point.
//!
//! Accepts TCP connections from NFC endpoints (a card-side reader and a
//! terminal-side emulator, or any number of either), groups them into
//! sessions by the session byte in each frame, and forwards every frame to
//! the other members of its session.
//!
//! # Usage
//!
//! ```text
//! nfc-relay [OPTIONS] [PLUGINS]...
//!
//! Arguments:
//!   [PLUGINS]...              Plugins to run on every frame, in order
//!
//! Options:
//!   -c, --config <PATH>       TOML config file
//!   -b, --bind <IP>           Address to bind [default: 0.0.0.0]
//!   -p, --port <PORT>         Port to listen on [default: 5566]
//!       --idle-timeout <SECS> Close connections idle this long [default: 300]
//!       --log-level <FILTER>  tracing filter directive [default: info]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the config file, then environment variables and
//! command-line flags.  Plugin names given on the command line replace the
//! file's list entirely.
//!
//! | Variable                  | Flag             |
//! |---------------------------|------------------|
//! | `NFC_RELAY_CONFIG`        | `--config`       |
//! | `NFC_RELAY_BIND`          | `--bind`         |
//! | `NFC_RELAY_PORT`          | `--port`         |
//! | `NFC_RELAY_IDLE_TIMEOUT`  | `--idle-timeout` |
//! | `NFC_RELAY_LOG_LEVEL`     | `--log-level`    |
//!
//! When neither `--log-level` nor its variable is set, `RUST_LOG` is used if
//! present, then the file's `log_level`.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nfc_relay_server::application::build_pipeline;
use nfc_relay_server::domain::RelayConfig;
use nfc_relay_server::infrastructure::{load_config, ConfigFile, RelayServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Session-multiplexing relay for captured NFC traffic.
#[derive(Debug, Parser)]
#[command(name = "nfc-relay", version)]
struct Cli {
    /// TOML config file.  Values given on the command line take precedence.
    #[arg(short, long, env = "NFC_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind to.  `0.0.0.0` listens on all interfaces.
    #[arg(short, long, env = "NFC_RELAY_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(short, long, env = "NFC_RELAY_PORT")]
    port: Option<u16>,

    /// Seconds without a complete frame before a connection is closed.
    #[arg(long, env = "NFC_RELAY_IDLE_TIMEOUT")]
    idle_timeout: Option<u64>,

    /// `tracing` filter directive, e.g. `debug` or `nfc_relay_server=trace`.
    #[arg(long, env = "NFC_RELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Plugins to apply to every frame, in order.
    plugins: Vec<String>,
}

impl Cli {
    /// Loads the config file (if any) and applies the command-line overrides.
    ///
    /// Returns the merged config and the file's log level.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a bind
    /// address is not an IP address.
    fn into_relay_config(self) -> anyhow::Result<(RelayConfig, String)> {
        let file = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ConfigFile::default(),
        };
        let file_log_level = file.server.log_level.clone();
        let mut config = file.into_relay_config().context("invalid config file")?;

        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            config.bind_addr = SocketAddr::new(ip, config.bind_addr.port());
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(secs) = self.idle_timeout {
            anyhow::ensure!(secs > 0, "--idle-timeout must be at least 1 second");
            config.idle_timeout = Duration::from_secs(secs);
        }
        if !self.plugins.is_empty() {
            config.plugins = self.plugins;
        }

        Ok((config, file_log_level))
    }
}

/// Picks the log filter: explicit flag, then `RUST_LOG`, then the file.
fn log_filter(cli_level: Option<&str>, file_level: &str) -> EnvFilter {
    if let Some(level) = cli_level {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(file_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cli_log_level = cli.log_level.clone();
    let (config, file_log_level) = cli.into_relay_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli_log_level.as_deref(), &file_log_level))
        .init();

    let pipeline = build_pipeline(&config.plugins).context("failed to load plugins")?;

    info!(
        tag = "server",
        origin = "server",
        "NFC relay starting: bind={}, idle_timeout={:?}, plugins={}",
        config.bind_addr,
        config.idle_timeout,
        pipeline.len()
    );

    let server = RelayServer::bind(config, pipeline).await?;

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!(tag = "server", origin = "server", "received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!(tag = "server", origin = "server", "failed to listen for Ctrl+C signal: {e}"),
        }
    });

    server.run(running).await;

    info!(tag = "server", origin = "server", "NFC relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
