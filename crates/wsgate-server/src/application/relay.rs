//! Frame relay between tracked connections.
//!
//! Every text or binary frame a client sends is forwarded to every other
//! client currently in the registry.  The sender does not get an echo.
//! Connections that are still handshaking, or that were admitted while
//! client tracking is disabled, receive nothing.

use tracing::{debug, info, warn};
use wsgate_core::{ConnectionId, Frame, Server, ServerEvent};

/// A data frame read from an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub from: ConnectionId,
    pub frame: Frame,
}

/// Forwards `inbound` to every tracked client except its sender.
///
/// Returns the number of clients that accepted the frame.
pub fn relay_frame<S>(server: &Server<S>, inbound: &InboundFrame) -> usize {
    let mut delivered = 0;
    for client in server.clients().filter(|c| c.id() != inbound.from) {
        match client.send(inbound.frame.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => debug!("relay to {} skipped: {e}", client.id()),
        }
    }
    debug!(
        "relayed {} byte frame from {} to {delivered} client(s)",
        inbound.frame.len(),
        inbound.from
    );
    delivered
}

/// Listener that reports server events through `tracing`.
pub fn log_server_event(event: &ServerEvent) {
    match event {
        ServerEvent::Connection(handle) => {
            info!("client {} connected ({})", handle.id(), handle.protocol());
        }
        ServerEvent::ClientError { id, error } => {
            warn!("client {id} error: {error}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
