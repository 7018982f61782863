//! wsgate: WebSocket upgrade gateway.
//!
//! Accepts HTTP upgrade requests, admits the valid ones through the
//! `wsgate-core` admission pipeline and relays frames between every client
//! that completed its handshake.
//!
//! # Usage
//!
//! ```text
//! wsgate [OPTIONS]
//!
//! Options:
//!   --config <FILE>                TOML config file
//!   --bind <ADDR>                  Listener address [default: 0.0.0.0:8080]
//!   --path <PATH>                  Only admit upgrades for this path
//!   --no-client-tracking           Do not keep a registry of open clients
//!   --handshake-timeout-ms <MS>    Head read / handshake write timeout
//!   --max-head-bytes <BYTES>       Largest accepted request head
//!   --log-level <FILTER>           Log filter when RUST_LOG is unset
//! ```
//!
//! Values are layered: built-in defaults, then the config file, then
//! environment variables and flags.
//!
//! | Variable                      | Flag                     |
//! |-------------------------------|--------------------------|
//! | `WSGATE_CONFIG`               | `--config`               |
//! | `WSGATE_BIND`                 | `--bind`                 |
//! | `WSGATE_PATH`                 | `--path`                 |
//! | `WSGATE_NO_CLIENT_TRACKING`   | `--no-client-tracking`   |
//! | `WSGATE_HANDSHAKE_TIMEOUT_MS` | `--handshake-timeout-ms` |
//! | `WSGATE_MAX_HEAD_BYTES`       | `--max-head-bytes`       |
//! | `WSGATE_LOG_LEVEL`            | `--log-level`            |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wsgate_server::domain::GatewayConfig;
use wsgate_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket upgrade gateway.
#[derive(Debug, Parser)]
#[command(
    name = "wsgate",
    about = "Admits WebSocket upgrades and relays frames between clients",
    version
)]
struct Cli {
    /// TOML config file.  Flags override values read from it.
    #[arg(long, env = "WSGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "WSGATE_BIND")]
    bind: Option<SocketAddr>,

    /// Only admit upgrades whose request path equals this exactly.
    #[arg(long, env = "WSGATE_PATH")]
    path: Option<String>,

    /// Admit connections without tracking them in the client registry.
    #[arg(long, env = "WSGATE_NO_CLIENT_TRACKING")]
    no_client_tracking: bool,

    #[arg(long, env = "WSGATE_HANDSHAKE_TIMEOUT_MS")]
    handshake_timeout_ms: Option<u64>,

    #[arg(long, env = "WSGATE_MAX_HEAD_BYTES")]
    max_head_bytes: Option<usize>,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long, env = "WSGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file, if any, and applies flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    fn into_gateway_config(self) -> anyhow::Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => GatewayConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(path) = self.path {
            config.server.path = Some(path);
        }
        if self.no_client_tracking {
            config.server.client_tracking = false;
        }
        if let Some(ms) = self.handshake_timeout_ms {
            config.handshake_timeout_ms = ms;
        }
        if let Some(bytes) = self.max_head_bytes {
            config.max_head_bytes = bytes;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Step 1: parse CLI and layer the config ──
    let config = Cli::parse().into_gateway_config()?;

    // ── Step 2: logging; RUST_LOG wins over the configured level ──
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "wsgate starting: bind={}, path={}, client_tracking={}",
        config.bind_addr,
        config.server.path.as_deref().unwrap_or("<any>"),
        config.server.client_tracking
    );

    // ── Step 3: shutdown flag, cleared on Ctrl+C ──
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Step 4: serve until the flag is cleared ──
    run_server(config, running).await?;

    info!("wsgate stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
