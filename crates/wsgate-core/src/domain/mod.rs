//! Domain types for the admission core.
//!
//! Nothing in this module performs I/O or spawns tasks.  The types here are
//! the data the orchestrator reasons about:
//!
//! - [`UpgradeRequest`] – the parsed HTTP request that asked for an upgrade.
//! - [`ServerConfig`] – immutable admission settings.
//! - [`ConnectionRegistry`] – slot table of currently open connections.

pub mod config;
pub mod registry;
pub mod request;

pub use config::ServerConfig;
pub use registry::{ConnectionRegistry, LiveCount};
pub use request::UpgradeRequest;
