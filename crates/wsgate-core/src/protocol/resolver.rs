//! Version header → protocol implementation lookup.
//!
//! The table is built once at startup and never changes.  Resolution never
//! fails: a missing, malformed or unknown `Sec-WebSocket-Version` falls back
//! to the designated default implementation, which is expected to negotiate
//! (or refuse) on its own terms.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::connection::Connection;
use super::lifecycle::LifecycleEmitter;
use crate::domain::request::UpgradeRequest;

/// Header carrying the protocol revision the peer speaks.
pub const VERSION_HEADER: &str = "sec-websocket-version";

/// Name reported for resolutions that used the default implementation.
pub const DEFAULT_PROTOCOL: &str = "drafts";

/// Constructor capability for one protocol revision.
///
/// `S` is the transport's socket type; the core never looks inside it.
/// `create` must return immediately.  Handshake work that needs to wait on
/// the socket belongs in a task the implementation spawns, which reports
/// back through `emitter`.
pub trait ProtocolFactory<S>: Send + Sync {
    /// Short name used in logs, e.g. `"hybi-13"`.
    fn name(&self) -> &'static str;

    /// Builds a handle for an admitted request.
    fn create(
        &self,
        request: UpgradeRequest,
        socket: S,
        emitter: LifecycleEmitter,
    ) -> Arc<dyn Connection>;
}

/// Static mapping from version string to [`ProtocolFactory`], plus a default.
pub struct ProtocolResolver<S> {
    versions: HashMap<String, Arc<dyn ProtocolFactory<S>>>,
    fallback: Arc<dyn ProtocolFactory<S>>,
}

impl<S> ProtocolResolver<S> {
    /// Creates a resolver whose only entry is the default implementation.
    pub fn new(fallback: Arc<dyn ProtocolFactory<S>>) -> Self {
        Self {
            versions: HashMap::new(),
            fallback,
        }
    }

    /// Maps an exact version string to `factory`.
    pub fn with_version(
        mut self,
        version: impl Into<String>,
        factory: Arc<dyn ProtocolFactory<S>>,
    ) -> Self {
        self.versions.insert(version.into(), factory);
        self
    }

    /// Returns the factory for `version`, or the default when there is no
    /// exact match.  Matching is byte-for-byte; `" 13"` is not `"13"`.
    pub fn resolve(&self, version: Option<&str>) -> &dyn ProtocolFactory<S> {
        let factory = version
            .and_then(|v| self.versions.get(v))
            .unwrap_or(&self.fallback);
        &**factory
    }

    /// Resolves using the request's version header.
    pub fn resolve_request(&self, request: &UpgradeRequest) -> &dyn ProtocolFactory<S> {
        self.resolve(request.header(VERSION_HEADER))
    }

    /// Resolves the request's version and constructs the handle.
    pub fn create(
        &self,
        request: UpgradeRequest,
        socket: S,
        emitter: LifecycleEmitter,
    ) -> Arc<dyn Connection> {
        let factory = self.resolve_request(&request);
        debug!(
            "connection {}: version {:?} resolved to {}",
            emitter.id(),
            request.header(VERSION_HEADER),
            factory.name()
        );
        factory.create(request, socket, emitter)
    }

    /// Explicitly mapped version strings, sorted.
    pub fn versions(&self) -> Vec<&str> {
        let mut versions: Vec<&str> = self.versions.keys().map(String::as_str).collect();
        versions.sort_unstable();
        versions
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
