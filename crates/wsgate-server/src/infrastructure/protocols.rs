//! Protocol implementations handed to the admission core.
//!
//! | Version header   | Implementation    | Behaviour                          |
//! |------------------|-------------------|------------------------------------|
//! | `7`, `8`, `13`   | [`HybiFactory`]   | RFC 6455 handshake, frame relay    |
//! | anything else    | [`LegacyFactory`] | `426 Upgrade Required`, then close |
//!
//! Each `create` call returns a handle immediately and spawns one task that
//! owns the socket.  The task performs the handshake, reports `Open`, pumps
//! frames in both directions and finally reports `Close`.  Inbound data
//! frames go to the gateway's relay channel as [`InboundFrame`]s; outbound
//! frames arrive from the handle over a per-connection channel.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    tungstenite::{
        handshake::derive_accept_key, protocol::Role, Error as WsError, Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{debug, warn};

use wsgate_core::{
    Connection, ConnectionError, ConnectionId, Frame, LifecycleEmitter, ProtocolFactory,
    ProtocolResolver, UpgradeRequest, VERSION_HEADER,
};

use crate::application::InboundFrame;
use crate::infrastructure::http_upgrade::{response_bytes, write_bad_request};

/// Revisions served by [`HybiFactory`], advertised by [`LegacyFactory`].
pub const HYBI_VERSIONS: [&str; 3] = ["13", "8", "7"];

const KEY_HEADER: &str = "sec-websocket-key";

/// Builds the gateway's version table.
pub fn protocol_table<S>(
    inbound: mpsc::UnboundedSender<InboundFrame>,
    handshake_timeout: Duration,
) -> ProtocolResolver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let fallback: Arc<dyn ProtocolFactory<S>> = Arc::new(LegacyFactory::new(handshake_timeout));
    let mut resolver = ProtocolResolver::new(fallback);
    for version in HYBI_VERSIONS {
        let factory: Arc<dyn ProtocolFactory<S>> =
            Arc::new(HybiFactory::new(version, inbound.clone(), handshake_timeout));
        resolver = resolver.with_version(version, factory);
    }
    resolver
}

// ── Outbound side of a handle ─────────────────────────────────────────────────

#[derive(Debug)]
enum Outbound {
    Frame(Frame),
    Close,
}

/// Handle for a connection whose socket is owned by a spawned task.
struct TaskConnection {
    id: ConnectionId,
    protocol: &'static str,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection for TaskConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn protocol(&self) -> &'static str {
        self.protocol
    }

    fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| ConnectionError::Closed)
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

// ── hybi (RFC 6455) ───────────────────────────────────────────────────────────

/// Serves one hybi revision using `tokio-tungstenite` for framing.
pub struct HybiFactory {
    version: &'static str,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    handshake_timeout: Duration,
}

impl HybiFactory {
    pub fn new(
        version: &'static str,
        inbound: mpsc::UnboundedSender<InboundFrame>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            version,
            inbound,
            handshake_timeout,
        }
    }
}

impl<S> ProtocolFactory<S> for HybiFactory
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.version
    }

    fn create(
        &self,
        request: UpgradeRequest,
        socket: S,
        emitter: LifecycleEmitter,
    ) -> Arc<dyn Connection> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let session = HybiSession {
            emitter,
            outbound: outbound_rx,
            inbound: self.inbound.clone(),
            handshake_timeout: self.handshake_timeout,
        };
        let handle = Arc::new(TaskConnection {
            id: session.emitter.id(),
            protocol: self.version,
            outbound: outbound_tx,
        });
        tokio::spawn(session.run(request, socket));
        handle
    }
}

struct HybiSession {
    emitter: LifecycleEmitter,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    handshake_timeout: Duration,
}

impl HybiSession {
    /// Runs the session to completion.  `Close` is always the last event.
    async fn run<S>(mut self, request: UpgradeRequest, socket: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.emitter.id();
        if let Err(e) = self.serve(request, socket).await {
            debug!("connection {id}: session ended with error: {e}");
            self.emitter.error(e);
        }
        self.outbound.close();
        self.emitter.close();
    }

    async fn serve<S>(
        &mut self,
        mut request: UpgradeRequest,
        mut socket: S,
    ) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Some(key) = request.header(KEY_HEADER).map(str::to_owned) else {
            if let Err(e) = write_bad_request(&mut socket).await {
                debug!("connection {}: failed to write 400: {e}", self.emitter.id());
            }
            return Err(ConnectionError::Handshake(
                "missing Sec-WebSocket-Key".to_string(),
            ));
        };

        let response = switching_protocols(&derive_accept_key(key.as_bytes()));
        timeout(self.handshake_timeout, socket.write_all(&response))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout {
                millis: self.handshake_timeout.as_millis() as u64,
            })??;

        let head = request.take_head();
        let ws = WebSocketStream::from_partially_read(socket, head, Role::Server, None).await;
        self.emitter.open();

        self.pump(ws).await
    }

    async fn pump<S>(&mut self, ws: WebSocketStream<S>) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = self.emitter.id();
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                outbound = self.outbound.recv() => match outbound {
                    Some(Outbound::Frame(frame)) => {
                        sink.send(to_ws_message(frame)).await.map_err(ws_error)?;
                    }
                    Some(Outbound::Close) | None => {
                        debug!("connection {id}: closing on request");
                        let _ = sink.close().await;
                        return Ok(());
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => self.forward(Frame::Text(text)),
                    Some(Ok(WsMessage::Binary(data))) => self.forward(Frame::Binary(data)),
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("connection {id}: peer closed");
                        return Ok(());
                    }
                    // Ping replies are queued by tungstenite and flushed on
                    // the next read or write.
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(()),
                    Some(Err(e)) => return Err(ws_error(e)),
                },
            }
        }
    }

    fn forward(&self, frame: Frame) {
        let inbound = InboundFrame {
            from: self.emitter.id(),
            frame,
        };
        if self.inbound.send(inbound).is_err() {
            debug!("connection {}: relay has shut down", self.emitter.id());
        }
    }
}

fn switching_protocols(accept: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
    .into_bytes()
}

fn to_ws_message(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text),
        Frame::Binary(data) => WsMessage::Binary(data),
    }
}

fn ws_error(e: WsError) -> ConnectionError {
    match e {
        WsError::Io(io) => ConnectionError::from(io),
        WsError::ConnectionClosed | WsError::AlreadyClosed => ConnectionError::Closed,
        other => ConnectionError::Protocol(other.to_string()),
    }
}

// ── Legacy drafts ─────────────────────────────────────────────────────────────

/// Default implementation for versions the gateway does not speak.
///
/// Answers `426 Upgrade Required` with the supported revisions, reports
/// [`ConnectionError::UnsupportedVersion`] and closes.  It never opens.
pub struct LegacyFactory {
    write_timeout: Duration,
}

impl LegacyFactory {
    pub fn new(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }
}

impl<S> ProtocolFactory<S> for LegacyFactory
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        wsgate_core::DEFAULT_PROTOCOL
    }

    fn create(
        &self,
        request: UpgradeRequest,
        mut socket: S,
        emitter: LifecycleEmitter,
    ) -> Arc<dyn Connection> {
        // Nothing is ever sent on this handle; the receiver is dropped.
        let (outbound_tx, _) = mpsc::unbounded_channel();
        let handle = Arc::new(TaskConnection {
            id: emitter.id(),
            protocol: wsgate_core::DEFAULT_PROTOCOL,
            outbound: outbound_tx,
        });

        let version = request.header(VERSION_HEADER).map(str::to_owned);
        let write_timeout = self.write_timeout;
        tokio::spawn(async move {
            match timeout(write_timeout, refuse(&mut socket)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("connection {}: failed to write 426: {e}", emitter.id()),
                Err(_) => warn!("connection {}: timed out writing 426", emitter.id()),
            }
            emitter.error(ConnectionError::UnsupportedVersion { version });
            emitter.close();
        });
        handle
    }
}

/// The `426` response [`LegacyFactory`] writes.
pub fn upgrade_required_response() -> Vec<u8> {
    response_bytes(
        426,
        "Upgrade Required",
        &[("Sec-WebSocket-Version", &HYBI_VERSIONS.join(", "))],
    )
}

async fn refuse<S>(socket: &mut S) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    socket.write_all(&upgrade_required_response()).await?;
    socket.shutdown().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
