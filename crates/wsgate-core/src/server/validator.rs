//! Upgrade request validation.

use crate::domain::config::ServerConfig;
use crate::domain::request::UpgradeRequest;

/// The only method an upgrade request may use.
pub const UPGRADE_METHOD: &str = "GET";

/// Header announcing the protocol the client wants to switch to.
pub const UPGRADE_HEADER: &str = "upgrade";

/// Protocol family this server speaks (compared case-insensitively).
pub const PROTOCOL_FAMILY: &str = "websocket";

/// Pure predicate over [`UpgradeRequest`]s.
///
/// A request passes when:
///
/// 1. its method is exactly `GET`,
/// 2. it carries an `Upgrade` header equal to `websocket` ignoring ASCII case,
/// 3. and, if a path restriction is configured, its path component equals
///    that path exactly.  Without a restriction every path passes.
///
/// Rejection is signalled only through the `false` return value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestValidator {
    path: Option<String>,
}

impl RequestValidator {
    pub fn new(path: Option<String>) -> Self {
        Self { path }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.path.clone())
    }

    /// Returns `true` if `request` is an acceptable upgrade.
    pub fn check(&self, request: &UpgradeRequest) -> bool {
        if request.method() != UPGRADE_METHOD {
            return false;
        }

        let wants_websocket = request
            .header(UPGRADE_HEADER)
            .is_some_and(|value| value.eq_ignore_ascii_case(PROTOCOL_FAMILY));
        if !wants_websocket {
            return false;
        }

        match &self.path {
            Some(required) => request.path() == required,
            None => true,
        }
    }
}
