//! Application layer for wsgate-server.
//!
//! Decides what happens to frames that arrive on admitted connections and
//! how server events are reported.  It never touches a socket: frames reach
//! it as [`InboundFrame`] values and leave through
//! [`wsgate_core::Connection::send`].

pub mod relay;

pub use relay::{log_server_event, relay_frame, InboundFrame};
