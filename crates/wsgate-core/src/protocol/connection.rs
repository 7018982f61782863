//! Connection handles and their error type.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Unique identifier of one admitted upgrade attempt.
///
/// Assigned by the [`Server`](crate::Server) before the protocol factory
/// runs, so every lifecycle event can be attributed to its handle even if the
/// handle never reaches the open state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An application message sent to or received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Failures reported by a protocol implementation after admission.
///
/// These never propagate out of the core as `Err`; the
/// [`Server`](crate::Server) turns them into
/// [`ServerEvent::ClientError`](crate::ServerEvent::ClientError).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The peer asked for a protocol revision no implementation speaks.
    #[error("unsupported protocol version: {}", .version.as_deref().unwrap_or("<none>"))]
    UnsupportedVersion { version: Option<String> },

    /// The handshake could not be completed (missing key, bad header, …).
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not finish within the allowed time.
    #[error("handshake timed out after {millis} ms")]
    HandshakeTimeout { millis: u64 },

    /// The peer violated the framing rules after the handshake.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The underlying socket failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A frame was sent to a connection that is no longer writable.
    #[error("connection closed")]
    Closed,
}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        ConnectionError::Io(e.to_string())
    }
}

/// A live, possibly still handshaking, connection.
///
/// Handles are shared: the registry holds one reference per open connection
/// and consumers receive another through
/// [`ServerEvent::Connection`](crate::ServerEvent::Connection).  All methods
/// therefore take `&self`; implementations typically forward to a writer task
/// over a channel.
#[cfg_attr(test, mockall::automock)]
pub trait Connection: Send + Sync {
    /// Identifier assigned at admission.
    fn id(&self) -> ConnectionId;

    /// Name of the protocol revision this handle speaks, e.g. `"13"`.
    fn protocol(&self) -> &'static str;

    /// Queues a frame for delivery to the peer.
    fn send(&self, frame: Frame) -> Result<(), ConnectionError>;

    /// Starts an orderly close.  The implementation emits `Close` once the
    /// connection is fully torn down.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_connection_id_displays_as_uuid() {
        let id = ConnectionId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }

    #[test]
    fn test_frame_len_counts_bytes() {
        assert_eq!(Frame::Text("héllo".into()).len(), 6);
        assert_eq!(Frame::Binary(vec![0; 4]).len(), 4);
        assert!(Frame::Binary(Vec::new()).is_empty());
    }

    #[test]
    fn test_unsupported_version_message_names_version() {
        let err = ConnectionError::UnsupportedVersion {
            version: Some("999".into()),
        };
        assert_eq!(err.to_string(), "unsupported protocol version: 999");
    }

    #[test]
    fn test_unsupported_version_message_without_header() {
        let err = ConnectionError::UnsupportedVersion { version: None };
        assert_eq!(err.to_string(), "unsupported protocol version: <none>");
    }

    #[test]
    fn test_io_error_converts_to_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err: ConnectionError = io.into();
        assert_eq!(err, ConnectionError::Io("pipe gone".into()));
    }
}
