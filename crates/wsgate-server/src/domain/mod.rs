//! Domain layer for wsgate-server.
//!
//! Plain configuration types.  Reading files and parsing CLI flags happens
//! here only as pure string → struct conversion; binding sockets does not.

pub mod config;

pub use config::{ConfigError, GatewayConfig};
