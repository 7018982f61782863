//! Lifecycle notifications emitted by protocol implementations.
//!
//! Every handle moves through the same small state machine:
//!
//! ```text
//! Handshaking ──Open──► Open ──Close──► (gone)
//!      │                  │
//!      └──Error──┐        └──Error──► Errored ──Close──► (gone)
//!                ▼
//!             Errored ──Close──► (gone)
//! ```
//!
//! A protocol implementation reports transitions through its
//! [`LifecycleEmitter`].  The emitter only enqueues; the
//! [`Server`](crate::Server) reacts to queued events one at a time, which is
//! what keeps registry mutation single-threaded.

use tokio::sync::mpsc;

use super::connection::{ConnectionError, ConnectionId};

/// What happened to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// The handshake completed; the connection can carry frames.
    Open,
    /// The connection is gone.  Emitted once per handle, after `Error` too.
    Close,
    /// The handshake or the connection failed.
    Error(ConnectionError),
}

/// A lifecycle transition attributed to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub id: ConnectionId,
    pub kind: Lifecycle,
}

/// Per-connection sending half of the server's lifecycle queue.
///
/// Cheap to clone; a protocol implementation may hand copies to its reader
/// and writer tasks.  Emitting after the server has shut down is silently
/// ignored.
#[derive(Debug, Clone)]
pub struct LifecycleEmitter {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl LifecycleEmitter {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<LifecycleEvent>) -> Self {
        Self { id, tx }
    }

    /// The connection this emitter reports for.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Reports a completed handshake.
    pub fn open(&self) {
        self.emit(Lifecycle::Open);
    }

    /// Reports that the connection is fully closed.
    pub fn close(&self) {
        self.emit(Lifecycle::Close);
    }

    /// Reports a failure.
    pub fn error(&self, error: ConnectionError) {
        self.emit(Lifecycle::Error(error));
    }

    /// Enqueues `kind`.  Returns `false` if the server is no longer listening.
    pub fn emit(&self, kind: Lifecycle) -> bool {
        self.tx.send(LifecycleEvent { id: self.id, kind }).is_ok()
    }
}
