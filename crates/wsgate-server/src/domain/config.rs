//! Gateway configuration.
//!
//! [`GatewayConfig`] can be loaded from a TOML file, and individual fields
//! are then overridden from the command line (see `main.rs`).  Every field is
//! optional in the file:
//!
//! ```toml
//! bind_addr = "0.0.0.0:8080"
//! handshake_timeout_ms = 10000
//! max_head_bytes = 8192
//! log_level = "info"
//!
//! [server]
//! path = "/chat"
//! client_tracking = true
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wsgate_core::ServerConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// All runtime settings for the gateway.
///
/// | Field                  | Default          |
/// |------------------------|------------------|
/// | `bind_addr`            | `0.0.0.0:8080`   |
/// | `server.path`          | none             |
/// | `server.client_tracking` | `true`         |
/// | `handshake_timeout_ms` | `10000`          |
/// | `max_head_bytes`       | `8192`           |
/// | `log_level`            | `"info"`         |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the TCP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Admission settings handed to the core server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upper bound on reading the request head and on writing the
    /// handshake response.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Largest request head accepted before the connection is refused.
    #[serde(default = "default_max_head_bytes")]
    pub max_head_bytes: usize,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}
fn default_max_head_bytes() -> usize {
    8192
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            server: ServerConfig::default(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_head_bytes: default_max_head_bytes(),
            log_level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed or a field has
    /// the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if its content is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
