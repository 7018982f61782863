//! Admission settings.
//!
//! [`ServerConfig`] is fixed once the [`Server`](crate::Server) is built.  It
//! deserializes from TOML (or any serde format) with every field optional, so
//! an empty `[server]` table yields the defaults:
//!
//! ```toml
//! [server]
//! path = "/chat"
//! client_tracking = true
//! ```

use serde::{Deserialize, Serialize};

/// Settings that govern which upgrades are admitted and whether open
/// connections are tracked.
///
/// | Field             | Default | Meaning                                    |
/// |-------------------|---------|--------------------------------------------|
/// | `path`            | `None`  | Exact request path required, if any        |
/// | `client_tracking` | `true`  | Keep open connections in the registry      |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// When set, only requests whose path component equals this string
    /// exactly are admitted.  No prefix or pattern matching is performed.
    #[serde(default)]
    pub path: Option<String>,

    /// When `false`, accepted connections still produce
    /// [`ServerEvent::Connection`](crate::ServerEvent::Connection) but are
    /// never placed in the registry.
    #[serde(default = "default_true")]
    pub client_tracking: bool,
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    /// Returns a config that admits only requests for `path`.
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: None,
            client_tracking: default_true(),
        }
    }
}
