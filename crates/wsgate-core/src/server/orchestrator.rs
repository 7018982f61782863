//! The admission orchestrator.
//!
//! [`Server`] composes the [`RequestValidator`], the [`ProtocolResolver`] and
//! the [`ConnectionRegistry`].  It is driven from two directions:
//!
//! 1. The transport calls [`Server::handle_upgrade`] once per upgrade request.
//!    Validation and resolution run synchronously; the call never blocks.
//! 2. Protocol implementations emit lifecycle events into the server's queue.
//!    The owner of the server pulls them with [`Server::next_lifecycle`] and
//!    feeds them to [`Server::dispatch`], one at a time.
//!
//! Because a single task owns the server and does both, registry mutation
//! and event emission are never concurrent and need no locks.
//!
//! # Per-connection state machine
//!
//! ```text
//! handle_upgrade ─► Handshaking ──Open──► Open ──Close──► removed
//!                        │                  │
//!                        └──Error──┐        └──Error──► Errored ──Close──► removed
//!                                  ▼
//!                               Errored ──Close──► removed
//! ```
//!
//! On `Open` the server first emits [`ServerEvent::Connection`] and only then
//! inserts the handle into the registry, so a consumer reacting to the event
//! must not assume the count already includes the new connection.  `Open`
//! is honoured only from `Handshaking`; a late or duplicate `Open` after an
//! error or a close is ignored, which keeps a handle from being registered
//! twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::config::ServerConfig;
use crate::domain::registry::{ConnectionRegistry, LiveCount};
use crate::domain::request::UpgradeRequest;
use crate::protocol::connection::{Connection, ConnectionError, ConnectionId, Frame};
use crate::protocol::lifecycle::{Lifecycle, LifecycleEmitter, LifecycleEvent};
use crate::protocol::resolver::ProtocolResolver;
use crate::server::events::{Notifier, ServerEvent};
use crate::server::validator::RequestValidator;

/// Result of [`Server::handle_upgrade`].
pub enum UpgradeOutcome<S> {
    /// A handle was created; lifecycle events will follow under this id.
    Accepted(ConnectionId),
    /// Validation failed.  The socket is returned untouched so the transport
    /// can decide how to dispose of it.
    Rejected(S),
}

impl<S> UpgradeOutcome<S> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpgradeOutcome::Accepted(_))
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            UpgradeOutcome::Accepted(id) => Some(*id),
            UpgradeOutcome::Rejected(_) => None,
        }
    }
}

impl<S> fmt::Debug for UpgradeOutcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeOutcome::Accepted(id) => f.debug_tuple("Accepted").field(id).finish(),
            UpgradeOutcome::Rejected(_) => f.write_str("Rejected"),
        }
    }
}

/// Where an admitted connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Handshaking,
    Open,
    Errored,
}

/// Per-handle bookkeeping kept alongside the handle itself.
struct Admission {
    handle: Arc<dyn Connection>,
    phase: Phase,
    /// Registry slot, set only once the handle has been inserted.
    slot: Option<usize>,
}

/// Accepts upgrade requests and tracks the resulting connections.
pub struct Server<S> {
    config: ServerConfig,
    validator: RequestValidator,
    resolver: ProtocolResolver<S>,
    registry: ConnectionRegistry<Arc<dyn Connection>>,
    admissions: HashMap<ConnectionId, Admission>,
    notifier: Notifier,
    lifecycle_tx: mpsc::UnboundedSender<LifecycleEvent>,
    lifecycle_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl<S> Server<S> {
    /// Creates a server with the given admission settings and protocol table.
    pub fn new(config: ServerConfig, resolver: ProtocolResolver<S>) -> Self {
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        Self {
            validator: RequestValidator::from_config(&config),
            config,
            resolver,
            registry: ConnectionRegistry::new(),
            admissions: HashMap::new(),
            notifier: Notifier::new(),
            lifecycle_tx,
            lifecycle_rx,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ProtocolResolver<S> {
        &self.resolver
    }

    // ── Consumer notifications ────────────────────────────────────────────────

    /// Registers a listener called inline for every [`ServerEvent`].
    pub fn on<F>(&mut self, listener: F) -> &mut Self
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        self.notifier.on(listener);
        self
    }

    /// Returns a channel receiving every [`ServerEvent`] emitted from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ServerEvent> {
        self.notifier.subscribe()
    }

    // ── Admission ─────────────────────────────────────────────────────────────

    /// Runs the validation predicate without admitting anything.
    pub fn check_request(&self, request: &UpgradeRequest) -> bool {
        self.validator.check(request)
    }

    /// Admits an upgrade request.
    ///
    /// `head` is whatever the transport already read from `socket` past the
    /// request head; it is attached to the request so the protocol
    /// implementation sees it before any further socket reads.
    ///
    /// A request that fails validation produces no handle and no event; the
    /// socket comes back in [`UpgradeOutcome::Rejected`].  An accepted
    /// request gets a fresh [`ConnectionId`] and a handle from the resolved
    /// protocol factory, which is now in the `Handshaking` phase.
    pub fn handle_upgrade(
        &mut self,
        mut request: UpgradeRequest,
        socket: S,
        head: Vec<u8>,
    ) -> UpgradeOutcome<S> {
        request.set_head(head);

        if !self.validator.check(&request) {
            debug!(
                "rejected upgrade: {} {} (upgrade={:?})",
                request.method(),
                request.url(),
                request.header("upgrade")
            );
            return UpgradeOutcome::Rejected(socket);
        }

        let id = ConnectionId::new();
        let emitter = LifecycleEmitter::new(id, self.lifecycle_tx.clone());
        let handle = self.resolver.create(request, socket, emitter);

        self.admissions.insert(
            id,
            Admission {
                handle,
                phase: Phase::Handshaking,
                slot: None,
            },
        );

        debug!("connection {id}: admitted, handshaking");
        UpgradeOutcome::Accepted(id)
    }

    // ── Lifecycle handling ────────────────────────────────────────────────────

    /// Waits for the next lifecycle event emitted by any handle.
    ///
    /// The server keeps a sender of its own, so this only ever returns
    /// `None` if the server is being torn down.
    pub async fn next_lifecycle(&mut self) -> Option<LifecycleEvent> {
        self.lifecycle_rx.recv().await
    }

    /// Returns the next queued lifecycle event without waiting.
    pub fn try_next_lifecycle(&mut self) -> Option<LifecycleEvent> {
        self.lifecycle_rx.try_recv().ok()
    }

    /// Dispatches every queued lifecycle event and returns how many there were.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.try_next_lifecycle() {
            self.dispatch(event);
            processed += 1;
        }
        processed
    }

    /// Applies one lifecycle event to the connection it belongs to.
    pub fn dispatch(&mut self, event: LifecycleEvent) {
        match event.kind {
            Lifecycle::Open => self.on_open(event.id),
            Lifecycle::Close => self.on_close(event.id),
            Lifecycle::Error(error) => self.on_error(event.id, error),
        }
    }

    fn on_open(&mut self, id: ConnectionId) {
        let handle = match self.admissions.get_mut(&id) {
            Some(admission) if admission.phase == Phase::Handshaking => {
                admission.phase = Phase::Open;
                Arc::clone(&admission.handle)
            }
            Some(admission) => {
                debug!("connection {id}: ignoring open in phase {:?}", admission.phase);
                return;
            }
            None => {
                debug!("connection {id}: ignoring open for unknown connection");
                return;
            }
        };

        info!("connection {id}: open ({})", handle.protocol());
        self.notifier
            .emit(&ServerEvent::Connection(Arc::clone(&handle)));

        if self.config.client_tracking {
            let slot = self.registry.insert(id, handle);
            if let Some(admission) = self.admissions.get_mut(&id) {
                admission.slot = Some(slot);
            }
            debug!(
                "connection {id}: registered in slot {slot} ({} open)",
                self.registry.count()
            );
        }
    }

    fn on_close(&mut self, id: ConnectionId) {
        let Some(admission) = self.admissions.remove(&id) else {
            debug!("connection {id}: ignoring close for unknown connection");
            return;
        };

        if let Some(slot) = admission.slot {
            self.registry.remove(slot, id);
        }

        info!(
            "connection {id}: closed after {:?} ({} open)",
            admission.phase,
            self.registry.count()
        );
    }

    fn on_error(&mut self, id: ConnectionId, error: ConnectionError) {
        if let Some(admission) = self.admissions.get_mut(&id) {
            admission.phase = Phase::Errored;
        }

        warn!("connection {id}: {error}");
        self.notifier.emit(&ServerEvent::ClientError { id, error });
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Iterates over the handles currently in the registry.
    pub fn clients(&self) -> impl Iterator<Item = &Arc<dyn Connection>> {
        self.registry.iter()
    }

    /// Number of connections currently in the registry.
    pub fn clients_count(&self) -> usize {
        self.registry.count()
    }

    /// A cloneable view of [`clients_count`](Self::clients_count) that other
    /// tasks can read.
    pub fn live_count(&self) -> LiveCount {
        self.registry.live_count()
    }

    /// Read access to the registry itself.
    pub fn registry(&self) -> &ConnectionRegistry<Arc<dyn Connection>> {
        &self.registry
    }

    /// Number of admitted handles not yet closed, tracked or not.
    pub fn admitted_count(&self) -> usize {
        self.admissions.len()
    }

    /// The lifecycle phase of an admitted, not yet closed, connection.
    pub fn phase(&self, id: ConnectionId) -> Option<Phase> {
        self.admissions.get(&id).map(|admission| admission.phase)
    }

    /// Sends `frame` to every registered connection.
    ///
    /// Returns the number of connections that accepted the frame.  A failed
    /// send is logged and skipped; the failing connection reports its own
    /// error through the lifecycle queue.
    pub fn broadcast(&self, frame: &Frame) -> usize {
        let mut delivered = 0;
        for handle in self.registry.iter() {
            match handle.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("connection {}: broadcast skipped: {e}", handle.id()),
            }
        }
        delivered
    }

    /// Asks every admitted connection to close.
    pub fn close_all(&self) {
        for admission in self.admissions.values() {
            admission.handle.close();
        }
    }
}

impl<S> fmt::Debug for Server<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("admitted", &self.admissions.len())
            .field("clients", &self.registry.count())
            .field("notifier", &self.notifier)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
