//! # wsgate-core
//!
//! Admission and connection-registry core for a WebSocket-style upgrade
//! server.  The crate decides whether an HTTP upgrade request is acceptable,
//! picks the sub-protocol implementation that matches the request's version
//! header, and keeps track of every connection that reaches the open state.
//!
//! It has no dependency on sockets or an HTTP stack: the caller hands in an
//! already-parsed [`UpgradeRequest`] together with an opaque socket value, and
//! the protocol implementations report back through lifecycle events.
//!
//! # Architecture overview
//!
//! ```text
//! transport ──► Server::handle_upgrade
//!                 ├─ RequestValidator::check     (method, Upgrade header, path)
//!                 └─ ProtocolResolver::create    (Sec-WebSocket-Version → factory)
//!
//! protocol impl ──► LifecycleEmitter ──► Server::dispatch
//!                                          ├─ ServerEvent::Connection / ClientError
//!                                          └─ ConnectionRegistry insert / remove
//! ```
//!
//! - **`domain`** – Pure data: the request, the server configuration and the
//!   slot-addressed registry.
//! - **`protocol`** – The seam to sub-protocol implementations: the
//!   [`Connection`] handle trait, lifecycle events and version resolution.
//! - **`server`** – The orchestrator that ties the pieces together.

pub mod domain;
pub mod protocol;
pub mod server;

pub use domain::config::ServerConfig;
pub use domain::registry::{ConnectionRegistry, LiveCount};
pub use domain::request::UpgradeRequest;
pub use protocol::connection::{Connection, ConnectionError, ConnectionId, Frame};
pub use protocol::lifecycle::{Lifecycle, LifecycleEmitter, LifecycleEvent};
pub use protocol::resolver::{ProtocolFactory, ProtocolResolver, DEFAULT_PROTOCOL, VERSION_HEADER};
pub use server::events::ServerEvent;
pub use server::orchestrator::{Server, UpgradeOutcome};
pub use server::validator::RequestValidator;
