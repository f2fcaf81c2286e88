//! The user-facing collaboration session.
//!
//! A [`CollabSession`] ties the subsystem together: it validates the room
//! identity, spawns the connection supervisor, and hands out the room
//! store, the connection-state signal, and the outbound subsystems
//! (cursor broadcaster, field lock coordinator, chat relay).
//!
//! Dropping the session (or calling [`CollabSession::close`]) tears
//! everything down: the supervisor exits, the pending reconnect sleep is
//! cancelled, the socket closes, and the store is discarded.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::chat::ChatRelay;
use crate::connection::{
    endpoint_url, CollabConfig, CollabError, ConnectionState, Outbound, Supervisor,
};
use crate::locks::FieldLockCoordinator;
use crate::presence::CursorBroadcaster;
use crate::protocol::{Participant, RoomIdentity};
use crate::room::{RoomEvent, RoomState, RoomStore};

/// One logical connection to one room, for one participant.
pub struct CollabSession {
    room: RoomIdentity,
    participant: Participant,
    store: Arc<RoomStore>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    cursor: CursorBroadcaster,
    locks: FieldLockCoordinator,
    chat: ChatRelay,
    task: Option<JoinHandle<()>>,
}

impl CollabSession {
    /// Start a session. Must be called within a tokio runtime.
    ///
    /// An invalid room identity (blank `room_type` or `room_id`) is a
    /// normal outcome: the session stays [`ConnectionState::Idle`] and
    /// never attempts a connection. The only error is a base URL that
    /// cannot address the collaboration service.
    pub fn connect(
        config: CollabConfig,
        room: RoomIdentity,
        participant: Participant,
    ) -> Result<Self, CollabError> {
        let store = Arc::new(RoomStore::new(config.event_capacity));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let outbound = Outbound::new(outbound_tx, state_rx.clone());

        let task = if room.is_valid() {
            let url = endpoint_url(&config.base_url, &room, &participant)?;
            let supervisor = Supervisor::new(
                url,
                store.clone(),
                state_tx,
                outbound_rx,
                shutdown_rx,
                config.reconnect_delay,
            );
            Some(tokio::spawn(supervisor.run()))
        } else {
            log::debug!(
                "room identity incomplete ({:?}/{:?}); staying idle",
                room.room_type,
                room.room_id
            );
            None
        };

        let cursor = CursorBroadcaster::new(outbound.clone(), config.cursor_interval);
        let locks = FieldLockCoordinator::new(outbound.clone(), participant.user_id.clone());
        let chat = ChatRelay::new(outbound);

        Ok(Self {
            room,
            participant,
            store,
            state_rx,
            shutdown_tx,
            cursor,
            locks,
            chat,
            task,
        })
    }

    // ── Signals and state ────────────────────────────────────────

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch signal for connection state; UIs gate affordances on this.
    pub fn state_signal(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the connection reaches `target`. Returns `false` if
    /// the session ended first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut rx = self.state_rx.clone();
        let reached = rx.wait_for(|state| *state == target).await.is_ok();
        reached
    }

    /// Shared room store (read-only to callers).
    pub fn store(&self) -> &Arc<RoomStore> {
        &self.store
    }

    /// Subscribe to store change events.
    pub fn events(&self) -> broadcast::Receiver<RoomEvent> {
        self.store.subscribe()
    }

    /// Clone the current room state for rendering.
    pub async fn snapshot(&self) -> RoomState {
        self.store.snapshot().await
    }

    pub fn room(&self) -> &RoomIdentity {
        &self.room
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    // ── Outbound subsystems ──────────────────────────────────────

    pub fn cursor(&self) -> &CursorBroadcaster {
        &self.cursor
    }

    pub fn locks(&self) -> &FieldLockCoordinator {
        &self.locks
    }

    pub fn chat(&self) -> &ChatRelay {
        &self.chat
    }

    /// Throttled cursor broadcast; drops silently while not connected.
    pub fn update_cursor(&self, x: f64, y: f64) -> bool {
        self.cursor.update(x, y)
    }

    /// Request an advisory lock on a field.
    pub fn focus_field(&self, field_id: &str) -> bool {
        self.locks.focus(field_id)
    }

    /// Release an advisory lock on a field.
    pub fn blur_field(&self, field_id: &str) -> bool {
        self.locks.blur(field_id)
    }

    /// Broadcast an optimistic edit for other clients to reflect.
    pub fn broadcast_field_change(&self, field_id: &str, value: serde_json::Value) -> bool {
        self.locks.broadcast_change(field_id, value)
    }

    /// Send a chat line; no-op for empty text or while disconnected.
    pub fn send_chat(&self, text: &str) -> bool {
        self.chat.send(text)
    }

    /// Whether someone other than this participant holds the advisory
    /// lock on a field. A UI hint, never an input gate.
    pub async fn is_field_locked_by_other(&self, field_id: &str) -> bool {
        let locks = &self.locks;
        self.store
            .read(|state| locks.is_locked_by_other(state, field_id))
            .await
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Tear the session down: terminal `Closed` state, cancelled
    /// reconnect timer, closed socket, discarded store. Idempotent.
    pub fn close(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Whether the supervisor task is still running.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for CollabSession {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

// ===================================================================
// Tests
// ===================================================================
