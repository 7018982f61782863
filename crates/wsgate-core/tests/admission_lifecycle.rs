//! Integration tests for the admission core.
//!
//! These drive [`Server`] only through its public API, playing the role of
//! both the transport (calling `handle_upgrade`) and the protocol
//! implementation (emitting lifecycle events through the emitters a fake
//! factory hands out).
//!
//! ```text
//! test ──handle_upgrade──► Server ──create──► FakeFactory (keeps emitter)
//! test ──emitter.open()──► lifecycle queue ──process_pending──► Server
//! ```

use std::sync::{Arc, Mutex};

use wsgate_core::{
    Connection, ConnectionError, ConnectionId, Frame, LifecycleEmitter, ProtocolFactory,
    ProtocolResolver, Server, ServerConfig, ServerEvent, UpgradeOutcome, UpgradeRequest,
};

// ── Fakes ─────────────────────────────────────────────────────────────────────

/// Socket stand-in that lets tests check the rejected socket comes back.
#[derive(Debug, PartialEq)]
struct FakeSocket(u32);

struct FakeConnection {
    id: ConnectionId,
    protocol: &'static str,
    sent: Mutex<Vec<Frame>>,
}

impl Connection for FakeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn protocol(&self) -> &'static str {
        self.protocol
    }

    fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        self.sent.lock().expect("lock poisoned").push(frame);
        Ok(())
    }

    fn close(&self) {}
}

/// Factory that records every emitter and handle it creates.
#[derive(Clone)]
struct FakeFactory {
    protocol: &'static str,
    created: Arc<Mutex<Vec<(LifecycleEmitter, Arc<FakeConnection>)>>>,
}

impl FakeFactory {
    fn new(protocol: &'static str) -> Self {
        Self {
            protocol,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn emitter(&self, n: usize) -> LifecycleEmitter {
        self.created.lock().expect("lock poisoned")[n].0.clone()
    }

    fn handle(&self, n: usize) -> Arc<FakeConnection> {
        Arc::clone(&self.created.lock().expect("lock poisoned")[n].1)
    }

    fn created_count(&self) -> usize {
        self.created.lock().expect("lock poisoned").len()
    }
}

impl ProtocolFactory<FakeSocket> for FakeFactory {
    fn name(&self) -> &'static str {
        self.protocol
    }

    fn create(
        &self,
        _request: UpgradeRequest,
        _socket: FakeSocket,
        emitter: LifecycleEmitter,
    ) -> Arc<dyn Connection> {
        let handle = Arc::new(FakeConnection {
            id: emitter.id(),
            protocol: self.protocol,
            sent: Mutex::new(Vec::new()),
        });
        self.created
            .lock()
            .expect("lock poisoned")
            .push((emitter, Arc::clone(&handle)));
        handle
    }
}

struct Harness {
    server: Server<FakeSocket>,
    hybi: FakeFactory,
    drafts: FakeFactory,
}

fn harness(config: ServerConfig) -> Harness {
    let hybi = FakeFactory::new("8");
    let drafts = FakeFactory::new("drafts");
    let resolver = ProtocolResolver::new(Arc::new(drafts.clone()))
        .with_version("8", Arc::new(hybi.clone()));
    Harness {
        server: Server::new(config, resolver),
        hybi,
        drafts,
    }
}

fn upgrade(url: &str, version: &str) -> UpgradeRequest {
    UpgradeRequest::new("GET", url)
        .with_header("Upgrade", "websocket")
        .with_header("Sec-WebSocket-Version", version)
}

// ── Admission ────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_requests_produce_no_connection_and_no_registry_change() {
    // Arrange
    let mut h = harness(ServerConfig::with_path("/chat"));
    let mut events = h.server.subscribe();
    let invalid = vec![
        UpgradeRequest::new("POST", "/chat").with_header("Upgrade", "websocket"),
        UpgradeRequest::new("GET", "/chat"),
        UpgradeRequest::new("GET", "/chat").with_header("Upgrade", "h2c"),
        upgrade("/other", "8"),
        upgrade("/chat/extra", "8"),
    ];

    // Act
    for (n, req) in invalid.into_iter().enumerate() {
        let outcome = h.server.handle_upgrade(req, FakeSocket(n as u32), Vec::new());
        match outcome {
            UpgradeOutcome::Rejected(socket) => assert_eq!(socket, FakeSocket(n as u32)),
            UpgradeOutcome::Accepted(id) => panic!("request {n} unexpectedly accepted as {id}"),
        }
    }
    h.server.process_pending();

    // Assert
    assert!(events.try_recv().is_err());
    assert_eq!(h.server.clients_count(), 0);
    assert_eq!(h.server.registry().slot_len(), 0);
    assert_eq!(h.hybi.created_count() + h.drafts.created_count(), 0);
}

#[test]
fn test_restricted_path_accepts_exact_path() {
    let mut h = harness(ServerConfig::with_path("/chat"));

    let outcome = h
        .server
        .handle_upgrade(upgrade("/chat?nick=ann", "8"), FakeSocket(0), Vec::new());

    assert!(outcome.is_accepted());
}

// ── Version resolution ───────────────────────────────────────────────────────

#[test]
fn test_mapped_version_uses_its_implementation() {
    let mut h = harness(ServerConfig::default());

    h.server
        .handle_upgrade(upgrade("/", "8"), FakeSocket(0), Vec::new());

    assert_eq!(h.hybi.created_count(), 1);
    assert_eq!(h.drafts.created_count(), 0);
}

#[test]
fn test_unmapped_version_falls_back_to_default_implementation() {
    let mut h = harness(ServerConfig::default());

    let outcome = h
        .server
        .handle_upgrade(upgrade("/", "999"), FakeSocket(0), Vec::new());

    assert!(outcome.is_accepted(), "unknown version is never an error");
    assert_eq!(h.drafts.created_count(), 1);
    assert_eq!(h.hybi.created_count(), 0);
}

#[test]
fn test_missing_version_header_falls_back_to_default_implementation() {
    let mut h = harness(ServerConfig::default());
    let req = UpgradeRequest::new("GET", "/").with_header("Upgrade", "websocket");

    h.server.handle_upgrade(req, FakeSocket(0), Vec::new());

    assert_eq!(h.drafts.created_count(), 1);
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn test_connection_is_emitted_once_and_before_registration() {
    // Arrange
    let mut h = harness(ServerConfig::default());
    let live = h.server.live_count();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    h.server.on(move |event| {
        if let ServerEvent::Connection(handle) = event {
            sink.lock().unwrap().push((handle.id(), live.get()));
        }
    });
    let ids: Vec<ConnectionId> = (0..3)
        .map(|n| {
            h.server
                .handle_upgrade(upgrade("/", "8"), FakeSocket(n), Vec::new())
                .connection_id()
                .unwrap()
        })
        .collect();

    // Act
    for n in 0..3 {
        h.hybi.emitter(n).open();
    }
    h.server.process_pending();

    // Assert – each handle seen once, each time with the count not yet
    // including it.
    let observed = observed.lock().unwrap().clone();
    assert_eq!(observed, vec![(ids[0], 0), (ids[1], 1), (ids[2], 2)]);
    assert_eq!(h.server.clients_count(), 3);
}

#[test]
fn test_closing_all_in_any_order_empties_registry_without_growth() {
    // Arrange – open N connections
    const N: usize = 8;
    let mut h = harness(ServerConfig::default());
    for n in 0..N {
        h.server
            .handle_upgrade(upgrade("/", "8"), FakeSocket(n as u32), Vec::new());
        h.hybi.emitter(n).open();
    }
    h.server.process_pending();
    assert_eq!(h.server.clients_count(), N);

    // Act – close in a scrambled order
    for n in [3, 0, 7, 5, 1, 6, 2, 4] {
        h.hybi.emitter(n).close();
    }
    h.server.process_pending();
    assert_eq!(h.server.clients_count(), 0);

    // Open N more
    for n in N..2 * N {
        h.server
            .handle_upgrade(upgrade("/", "8"), FakeSocket(n as u32), Vec::new());
        h.hybi.emitter(n).open();
    }
    h.server.process_pending();

    // Assert
    assert_eq!(h.server.clients_count(), N);
    assert_eq!(h.server.registry().slot_len(), N, "free slots must be reused");
}

#[test]
fn test_tracking_disabled_still_emits_connection_but_count_stays_zero() {
    let mut h = harness(ServerConfig {
        client_tracking: false,
        ..ServerConfig::default()
    });
    let mut events = h.server.subscribe();

    for n in 0..3 {
        h.server
            .handle_upgrade(upgrade("/", "8"), FakeSocket(n), Vec::new());
        h.hybi.emitter(n as usize).open();
        h.server.process_pending();
        assert_eq!(h.server.clients_count(), 0);
    }

    let mut connections = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.name(), "connection");
        connections += 1;
    }
    assert_eq!(connections, 3);

    for n in 0..3 {
        h.hybi.emitter(n).close();
    }
    h.server.process_pending();
    assert_eq!(h.server.clients_count(), 0);
}

#[test]
fn test_error_before_open_never_registers_and_close_does_not_underflow() {
    // Arrange – one healthy connection so an underflow would be visible
    let mut h = harness(ServerConfig::default());
    let mut events = h.server.subscribe();
    h.server
        .handle_upgrade(upgrade("/", "8"), FakeSocket(0), Vec::new());
    h.server
        .handle_upgrade(upgrade("/", "8"), FakeSocket(1), Vec::new());
    h.hybi.emitter(0).open();
    h.server.process_pending();
    let _ = events.try_recv();

    // Act
    let failing = h.hybi.emitter(1);
    failing.error(ConnectionError::HandshakeTimeout { millis: 10_000 });
    failing.open();
    failing.close();
    failing.close();
    h.server.process_pending();

    // Assert
    match events.try_recv() {
        Ok(ServerEvent::ClientError { id, error }) => {
            assert_eq!(id, failing.id());
            assert_eq!(error, ConnectionError::HandshakeTimeout { millis: 10_000 });
        }
        other => panic!("expected clientError, got {other:?}"),
    }
    assert!(events.try_recv().is_err());
    assert_eq!(h.server.clients_count(), 1);
    assert!(h.server.clients().all(|c| c.id() != failing.id()));
}

#[test]
fn test_client_error_does_not_affect_other_connections() {
    let mut h = harness(ServerConfig::default());
    for n in 0..3 {
        h.server
            .handle_upgrade(upgrade("/", "8"), FakeSocket(n), Vec::new());
        h.hybi.emitter(n as usize).open();
    }
    h.server.process_pending();

    h.hybi.emitter(1).error(ConnectionError::Io("reset".into()));
    h.hybi.emitter(1).close();
    h.server.process_pending();

    assert_eq!(h.server.clients_count(), 2);
    let delivered = h.server.broadcast(&Frame::Text("still here".into()));
    assert_eq!(delivered, 2);
    assert!(h.hybi.handle(1).sent.lock().unwrap().is_empty());
    assert_eq!(h.hybi.handle(0).sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_next_lifecycle_yields_events_in_emission_order() {
    let mut h = harness(ServerConfig::default());
    let id = h
        .server
        .handle_upgrade(upgrade("/", "8"), FakeSocket(0), Vec::new())
        .connection_id()
        .unwrap();
    let emitter = h.hybi.emitter(0);

    tokio::spawn(async move {
        emitter.open();
        emitter.close();
    });

    let first = h.server.next_lifecycle().await.expect("open");
    assert_eq!(first.id, id);
    h.server.dispatch(first);
    assert_eq!(h.server.clients_count(), 1);

    let second = h.server.next_lifecycle().await.expect("close");
    h.server.dispatch(second);
    assert_eq!(h.server.clients_count(), 0);
}
