//! wsgate-server library crate.
//!
//! A TCP front end that admits WebSocket upgrades through `wsgate-core` and
//! relays frames between the connections it tracks.
//!
//! # Architecture
//!
//! ```text
//! Browser / ws client
//!         ↕
//! [wsgate-server]
//!   ├── domain/            GatewayConfig (TOML + CLI)
//!   ├── application/       Relay policy, event logging
//!   └── infrastructure/
//!         ├── http_upgrade/  Read the HTTP request head, write rejections
//!         ├── protocols/     hybi (RFC 6455) and legacy draft implementations
//!         └── listener/      Accept loop + single admission task
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` depends on `domain` and `wsgate-core` only.
//! - `infrastructure` owns every socket and every spawned task.

/// Domain layer: configuration.
pub mod domain;

/// Application layer: what happens to frames and server events.
pub mod application;

/// Infrastructure layer: sockets, handshakes, tasks.
pub mod infrastructure;
