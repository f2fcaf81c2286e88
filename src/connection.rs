//! Connection supervision: socket lifecycle, reconnect, teardown.
//!
//! One supervisor owns one logical connection to a room:
//!
//! ```text
//! Idle ── start ──► Connecting ──► Connected ──► Disconnected
//!                       ▲                             │
//!                       │         fixed delay         ▼
//!                       └──────────────────────  Reconnecting
//!
//!                 close() from any state ──► Closed (terminal)
//! ```
//!
//! The supervisor is an explicit state-machine object: it owns the socket
//! handle, the retry sleep, and the shutdown signal, so teardown is one
//! deterministic call instead of scattered cleanup. Every await point
//! races the shutdown watch channel — no reconnect timer or handshake
//! outlives `close()`.
//!
//! Connection faults are never surfaced as errors. They become state
//! transitions the UI may choose to indicate; recovery is automatic and
//! indefinite until explicit teardown.
//!
//! Reference: Kleppmann, Chapter 8 — The Trouble with Distributed Systems

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::protocol::{ClientMessage, Participant, ProtocolError, RoomIdentity, ServerMessage};
use crate::room::RoomStore;

// ───────────────────────────────────────────────────────────────────
// Public surface
// ───────────────────────────────────────────────────────────────────

/// Connection lifecycle, exposed as a watch signal so UIs can gate
/// affordances (chat input, cursor tracking) without polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempted (missing/blank room identity).
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    /// Terminal; no further transitions.
    Closed,
}

/// Session configuration. The only environment input is `base_url`,
/// supplied by the hosting application from its own origin.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Service origin, `ws`/`wss` (or `http`/`https`, mapped over).
    pub base_url: String,
    /// Fixed delay between reconnect attempts. A failed attempt costs a
    /// single handshake and a stale collaboration feed costs more, so
    /// the retry cadence stays flat rather than backing off.
    pub reconnect_delay: Duration,
    /// Minimum interval between outbound cursor samples.
    pub cursor_interval: Duration,
    /// Outbound frame buffer (frames queued toward the socket writer).
    pub outbound_capacity: usize,
    /// Store change-event fan-out buffer per subscriber.
    pub event_capacity: usize,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://127.0.0.1:9090".to_owned(),
            reconnect_delay: Duration::from_secs(3),
            cursor_interval: Duration::from_millis(50),
            outbound_capacity: 256,
            event_capacity: 256,
        }
    }
}

/// The one way this subsystem fails toward the caller: a base URL that
/// cannot address the collaboration service. Everything at runtime
/// self-heals or is silently absorbed.
#[derive(Debug, Clone, Error)]
pub enum CollabError {
    #[error("invalid collaboration endpoint: {0}")]
    Config(String),
}

/// Build the room endpoint:
/// `{base}/collaboration/{room_type}/{room_id}?user_id=..&user_name=..`
/// with the display name percent-encoded.
pub fn endpoint_url(
    base_url: &str,
    room: &RoomIdentity,
    participant: &Participant,
) -> Result<Url, CollabError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| CollabError::Config(format!("invalid base url `{base_url}`: {e}")))?;

    // The collaboration scheme is the ws variant of the host origin.
    let mapped = match url.scheme() {
        "ws" | "wss" => None,
        "http" => Some("ws"),
        "https" => Some("wss"),
        other => {
            return Err(CollabError::Config(format!(
                "unsupported base url scheme `{other}`"
            )))
        }
    };
    if let Some(scheme) = mapped {
        url.set_scheme(scheme)
            .map_err(|()| CollabError::Config("could not map base url scheme".into()))?;
    }

    url.path_segments_mut()
        .map_err(|()| CollabError::Config("base url cannot be a base".into()))?
        .pop_if_empty()
        .extend(["collaboration", room.room_type.as_str(), room.room_id.as_str()]);

    url.query_pairs_mut()
        .append_pair("user_id", &participant.user_id)
        .append_pair("user_name", &participant.display_name);

    Ok(url)
}

// ───────────────────────────────────────────────────────────────────
// Outbound gate
// ───────────────────────────────────────────────────────────────────

/// Fire-and-forget sender toward the socket writer.
///
/// Sends while the connection is not `Connected` are silently dropped:
/// expected behavior for a best-effort presence layer, not an error.
/// Nothing here suspends the caller.
#[derive(Clone)]
pub(crate) struct Outbound {
    tx: mpsc::Sender<String>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Outbound {
    pub(crate) fn new(tx: mpsc::Sender<String>, state_rx: watch::Receiver<ConnectionState>) -> Self {
        Self { tx, state_rx }
    }

    /// Encode and enqueue one intent. Returns whether the frame was
    /// actually handed to the writer.
    pub(crate) fn send(&self, msg: &ClientMessage) -> bool {
        if *self.state_rx.borrow() != ConnectionState::Connected {
            log::trace!("dropping outbound frame while not connected");
            return false;
        }

        let text = match msg.encode() {
            Ok(text) => text,
            Err(e) => {
                log::warn!("failed to encode outbound frame: {e}");
                return false;
            }
        };

        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("outbound buffer full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::trace!("outbound channel closed, dropping frame");
                false
            }
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }
}

// ───────────────────────────────────────────────────────────────────
// Supervisor
// ───────────────────────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a connection epoch ended.
enum EpochEnd {
    /// Socket closed or faulted; the supervisor schedules a retry.
    Remote,
    /// Teardown was requested; the supervisor exits.
    Shutdown,
}

/// Owns the socket for the lifetime of the session task.
pub(crate) struct Supervisor {
    url: String,
    store: Arc<RoomStore>,
    state_tx: watch::Sender<ConnectionState>,
    outbound_rx: mpsc::Receiver<String>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_delay: Duration,
}

impl Supervisor {
    pub(crate) fn new(
        url: Url,
        store: Arc<RoomStore>,
        state_tx: watch::Sender<ConnectionState>,
        outbound_rx: mpsc::Receiver<String>,
        shutdown_rx: watch::Receiver<bool>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            store,
            state_tx,
            outbound_rx,
            shutdown_rx,
            reconnect_delay,
        }
    }

    /// Run until teardown. Reconnection is automatic and indefinite.
    pub(crate) async fn run(mut self) {
        loop {
            if shutdown_requested(&self.shutdown_rx) {
                break;
            }

            self.transition(ConnectionState::Connecting);

            let handshake = tokio::select! {
                res = connect_async(self.url.as_str()) => Some(res),
                () = wait_shutdown(&mut self.shutdown_rx) => None,
            };

            match handshake {
                None => break,
                Some(Ok((ws, _response))) => {
                    self.transition(ConnectionState::Connected);
                    // New connection epoch: everything previously held is
                    // stale until the server's room_state arrives.
                    self.store.begin_epoch().await;
                    log::info!("collaboration channel connected: {}", self.url);

                    let end = drive(
                        ws,
                        &self.store,
                        &mut self.outbound_rx,
                        &mut self.shutdown_rx,
                    )
                    .await;

                    if matches!(end, EpochEnd::Shutdown) {
                        break;
                    }
                    self.transition(ConnectionState::Disconnected);
                }
                Some(Err(e)) => {
                    log::warn!("collaboration handshake failed: {e}");
                    self.transition(ConnectionState::Disconnected);
                }
            }

            if shutdown_requested(&self.shutdown_rx) {
                break;
            }

            self.transition(ConnectionState::Reconnecting);
            tokio::select! {
                () = tokio::time::sleep(self.reconnect_delay) => {}
                () = wait_shutdown(&mut self.shutdown_rx) => break,
            }
        }

        self.transition(ConnectionState::Closed);
        self.store.clear().await;
        log::info!("collaboration channel closed: {}", self.url);
    }

    fn transition(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            log::debug!("connection state {prev:?} -> {next:?}");
        }
    }
}

/// Pump one connected socket until it ends.
async fn drive(
    ws: WsStream,
    store: &RoomStore,
    outbound_rx: &mut mpsc::Receiver<String>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> EpochEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => apply_frame(store, text.as_str()).await,
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return EpochEnd::Remote;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    log::info!("collaboration channel closed by server");
                    return EpochEnd::Remote;
                }
                Some(Ok(_)) => {
                    // Binary and pong frames are not part of this protocol.
                    log::trace!("ignoring non-text frame");
                }
                Some(Err(e)) => {
                    log::warn!("collaboration socket error: {e}");
                    return EpochEnd::Remote;
                }
            },

            intent = outbound_rx.recv() => match intent {
                Some(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return EpochEnd::Remote;
                    }
                }
                // All session handles dropped; nothing left to supervise.
                None => return EpochEnd::Shutdown,
            },

            () = wait_shutdown(shutdown_rx) => {
                let _ = sink.send(Message::Close(None)).await;
                return EpochEnd::Shutdown;
            }
        }
    }
}

/// Decode and apply one inbound frame. Decode faults drop the frame,
/// never the connection.
async fn apply_frame(store: &RoomStore, text: &str) {
    match ServerMessage::decode(text) {
        Ok(msg) => store.apply(msg).await,
        Err(ProtocolError::UnknownTag(tag)) => {
            log::trace!("ignoring unknown frame tag `{tag}`");
        }
        Err(e) => log::warn!("dropping inbound frame: {e}"),
    }
}

fn shutdown_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Resolve when teardown is requested (or the session handle is gone).
async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    // An Err means the sender dropped without signalling — same outcome.
    let _ = rx.wait_for(|requested| *requested).await;
}

// ===================================================================
// Tests
// ===================================================================
