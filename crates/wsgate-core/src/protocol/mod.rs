//! The seam between the admission core and sub-protocol implementations.
//!
//! A sub-protocol implementation (RFC 6455, a legacy draft, a test double)
//! plugs in by providing a [`ProtocolFactory`].  The factory turns an admitted
//! request and its socket into a [`Connection`] handle and reports the
//! handle's progress through a [`LifecycleEmitter`].

pub mod connection;
pub mod lifecycle;
pub mod resolver;

pub use connection::{Connection, ConnectionError, ConnectionId, Frame};
pub use lifecycle::{Lifecycle, LifecycleEmitter, LifecycleEvent};
pub use resolver::{ProtocolFactory, ProtocolResolver, DEFAULT_PROTOCOL, VERSION_HEADER};
