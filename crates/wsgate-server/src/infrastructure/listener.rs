//! Accept loop and admission task.
//!
//! ```text
//!  accept loop ──spawn──► head reader (per socket) ──PendingUpgrade──┐
//!                                                                    ▼
//!  protocol tasks ──LifecycleEvent──► admission task (owns Server) ◄─┘
//!  protocol tasks ──InboundFrame────►        │
//!                                            └──relay──► Connection::send
//! ```
//!
//! Only the admission task touches the [`Server`], so admission, lifecycle
//! dispatch and relaying never run concurrently with each other.  Sockets
//! are read in their own tasks so one slow client cannot stall admission.
//!
//! Shutdown is triggered by clearing the shared `running` flag.  The accept
//! loop notices within 200 ms, the admission task asks every connection to
//! close and waits up to [`SHUTDOWN_GRACE`] for their `Close` events.

use std::io;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use wsgate_core::{LiveCount, Server, ServerEvent, UpgradeOutcome, UpgradeRequest};

use crate::application::{log_server_event, relay_frame, InboundFrame};
use crate::domain::GatewayConfig;
use crate::infrastructure::http_upgrade::{read_request_head, write_bad_request, HttpUpgradeError};
use crate::infrastructure::protocols::protocol_table;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// How long shutdown waits for connections to report `Close`.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Capacity of the head reader → admission task queue.
const PENDING_QUEUE: usize = 128;

/// A socket whose request head has been read, waiting for admission.
struct PendingUpgrade {
    request: UpgradeRequest,
    socket: TcpStream,
    peer: SocketAddr,
}

#[derive(Debug, Clone, Copy)]
struct HeadLimits {
    max_bytes: usize,
    timeout: Duration,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(config: GatewayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    Gateway::bind(config).await?.run(running).await
}

/// A bound listener plus the admission core it feeds.
pub struct Gateway {
    listener: TcpListener,
    server: Server<TcpStream>,
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
    limits: HeadLimits,
}

impl Gateway {
    /// Binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is in use or cannot be bound.
    pub async fn bind(config: GatewayConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;
        Ok(Self::from_listener(listener, config))
    }

    /// Wraps an already bound listener.  `config.bind_addr` is ignored.
    pub fn from_listener(listener: TcpListener, config: GatewayConfig) -> Self {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let resolver = protocol_table(inbound_tx, config.handshake_timeout());
        let mut server = Server::new(config.server.clone(), resolver);
        server.on(log_server_event);

        Self {
            listener,
            server,
            inbound,
            limits: HeadLimits {
                max_bytes: config.max_head_bytes,
                timeout: config.handshake_timeout(),
            },
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Live number of tracked clients, readable from other tasks.
    pub fn live_count(&self) -> LiveCount {
        self.server.live_count()
    }

    /// Subscribes to server events.  Call before [`run`](Self::run).
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ServerEvent> {
        self.server.subscribe()
    }

    /// Runs the accept loop and the admission task until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept loop task panicked.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        // ── Step 1: take ownership of the parts ──
        let Self {
            listener,
            mut server,
            mut inbound,
            limits,
        } = self;

        match listener.local_addr() {
            Ok(addr) => info!("wsgate listening on {addr}"),
            Err(e) => warn!("listening on an unknown address: {e}"),
        }

        // ── Step 2: start accepting; head readers feed `upgrades` ──
        let (upgrade_tx, mut upgrades) = mpsc::channel::<PendingUpgrade>(PENDING_QUEUE);
        let mut accept_task = tokio::spawn(accept_loop(listener, upgrade_tx, limits, running));

        // ── Step 3: admission loop, the only code that touches `server` ──
        let accept_result = loop {
            tokio::select! {
                Some(pending) = upgrades.recv() => admit(&mut server, pending),
                // open / close / error from protocol tasks
                Some(event) = server.next_lifecycle() => server.dispatch(event),
                Some(frame) = inbound.recv() => {
                    relay_frame(&server, &frame);
                }
                // Accept loop ends only once `running` is cleared.
                result = &mut accept_task => break result,
            }
        };

        // ── Step 4: close every connection and drain their events ──
        shutdown(&mut server).await;
        accept_result.context("accept loop task failed")
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    upgrades: mpsc::Sender<PendingUpgrade>,
    limits: HeadLimits,
    running: Arc<AtomicBool>,
) {
    loop {
        // Check for shutdown
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Bounded accept so the flag above is re-checked every ACCEPT_POLL
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((socket, peer))) => {
                debug!("accepted connection from {peer}");
                // Head read runs off the accept path
                tokio::spawn(read_upgrade(socket, peer, limits, upgrades.clone()));
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {} // poll timeout
        }
    }
}

/// Reads one request head and queues the socket for admission.
async fn read_upgrade(
    mut socket: TcpStream,
    peer: SocketAddr,
    limits: HeadLimits,
    upgrades: mpsc::Sender<PendingUpgrade>,
) {
    match timeout(limits.timeout, read_request_head(&mut socket, limits.max_bytes)).await {
        Ok(Ok(request)) => {
            let pending = PendingUpgrade {
                request,
                socket,
                peer,
            };
            if upgrades.send(pending).await.is_err() {
                debug!("{peer}: admission has stopped; dropping connection");
            }
        }
        Ok(Err(HttpUpgradeError::ConnectionClosed { received })) => {
            debug!("{peer}: closed after {received} byte(s) of request head");
        }
        Ok(Err(e)) => {
            warn!("{peer}: {e}");
            if let Err(e) = write_bad_request(&mut socket).await {
                debug!("{peer}: failed to write 400: {e}");
            }
        }
        Err(_) => debug!("{peer}: request head not received in time"),
    }
}

// ── Admission task ────────────────────────────────────────────────────────────

fn admit(server: &mut Server<TcpStream>, pending: PendingUpgrade) {
    let PendingUpgrade {
        mut request,
        socket,
        peer,
    } = pending;
    // Bytes read past the head belong to the protocol implementation.
    let head = request.take_head();

    match server.handle_upgrade(request, socket, head) {
        UpgradeOutcome::Accepted(id) => debug!("{peer}: admitted as {id}"),
        UpgradeOutcome::Rejected(mut socket) => {
            info!("{peer}: upgrade rejected");
            // 400 is written off the admission task
            tokio::spawn(async move {
                if let Err(e) = write_bad_request(&mut socket).await {
                    debug!("{peer}: failed to write 400: {e}");
                }
            });
        }
    }
}

async fn shutdown(server: &mut Server<TcpStream>) {
    info!(
        "shutting down; closing {} connection(s)",
        server.admitted_count()
    );
    server.close_all();

    // Each close arrives as a lifecycle event; dispatch them until none are left.
    let drained = timeout(SHUTDOWN_GRACE, async {
        while server.admitted_count() > 0 {
            match server.next_lifecycle().await {
                Some(event) => server.dispatch(event),
                None => break,
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            "{} connection(s) did not close within {SHUTDOWN_GRACE:?}",
            server.admitted_count()
        );
    }
}
