//! Notifications the server delivers to its consumers.
//!
//! Consumers either register a synchronous listener with [`Notifier::on`]
//! (called inline, in registration order) or take a channel with
//! [`Notifier::subscribe`].  Subscribe before traffic starts: there is no
//! replay of events emitted before a subscription existed.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::connection::{Connection, ConnectionError, ConnectionId};

/// Something the server wants its consumers to know about.
#[derive(Clone)]
pub enum ServerEvent {
    /// A connection completed its handshake.
    Connection(Arc<dyn Connection>),
    /// An admitted connection failed.
    ClientError {
        id: ConnectionId,
        error: ConnectionError,
    },
}

impl ServerEvent {
    /// Event name as used in logs: `"connection"` or `"clientError"`.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connection(_) => "connection",
            ServerEvent::ClientError { .. } => "clientError",
        }
    }

    /// The connection the event is about.
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            ServerEvent::Connection(handle) => handle.id(),
            ServerEvent::ClientError { id, .. } => *id,
        }
    }
}

impl fmt::Debug for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerEvent::Connection(handle) => f
                .debug_struct("Connection")
                .field("id", &handle.id())
                .field("protocol", &handle.protocol())
                .finish(),
            ServerEvent::ClientError { id, error } => f
                .debug_struct("ClientError")
                .field("id", id)
                .field("error", error)
                .finish(),
        }
    }
}

type Listener = Box<dyn FnMut(&ServerEvent) + Send>;

/// Observer registration and emission, owned by the server as a field.
#[derive(Default)]
pub struct Notifier {
    listeners: Vec<Listener>,
    subscribers: Vec<mpsc::UnboundedSender<ServerEvent>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener that is called inline for every event.
    pub fn on<F>(&mut self, listener: F)
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Returns a receiver that gets every event emitted from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Delivers `event` to listeners first, then to subscribers.
    ///
    /// Subscribers whose receiver has been dropped are forgotten.
    pub fn emit(&mut self, event: &ServerEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Number of live channel subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
