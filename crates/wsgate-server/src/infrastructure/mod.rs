//! Infrastructure layer for wsgate-server.
//!
//! Owns the TCP listener, every accepted socket and every spawned task.
//!
//! - [`http_upgrade`] reads request heads and writes plain-HTTP refusals.
//! - [`protocols`] implements the version table handed to the core.
//! - [`listener`] runs the accept loop and the admission task.

pub mod http_upgrade;
pub mod listener;
pub mod protocols;

pub use listener::{run_server, Gateway};
pub use protocols::{protocol_table, HybiFactory, LegacyFactory, HYBI_VERSIONS};
