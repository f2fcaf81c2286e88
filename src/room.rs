//! Local room state, built exclusively by applying inbound frames.
//!
//! The store is a single mutable projection of the server's broadcasts,
//! applied in arrival order, never reordered or batched:
//!
//! ```text
//! room_state    → atomic replace of presence/cursor/lock maps
//! user_joined   → upsert presence by user_id (idempotent)
//! user_left     → remove presence AND the user's cursor AND their locks
//! cursor_update → upsert cursor sample (last-write-wins, no history)
//! field_focus   → upsert advisory lock for the field
//! field_blur    → remove the lock, if still held by the sender
//! chat_message  → append to the ordered chat log
//! ```
//!
//! Every apply is an O(1) map mutation followed by a change notification.
//! Nothing here blocks, and nothing here resolves conflicts — the server's
//! serialized broadcast order is the only truth this store knows.
//!
//! Reference: Kleppmann, Chapter 5 — Replication

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use crate::protocol::{CursorPoint, PresenceEntry, RoomSnapshot, ServerMessage};

// ───────────────────────────────────────────────────────────────────
// Locally-held entities
// ───────────────────────────────────────────────────────────────────

/// Latest cursor sample for one remote participant.
///
/// Ephemeral: superseded by the next sample from the same user, never
/// queued or replayed. `received_at` is local arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorSample {
    pub position: CursorPoint,
    pub received_at: DateTime<Utc>,
}

/// Advisory lock on an editable field, as this client currently sees it.
///
/// Two users acquiring near-simultaneously may each transiently appear
/// as the holder on the other's screen until the server's canonical
/// broadcast lands; both clients then converge to the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLock {
    pub field_id: String,
    pub holder_user_id: String,
    pub holder_display_name: String,
    pub acquired_at: DateTime<Utc>,
}

/// One chat line. Append-only, never mutated or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub user_id: String,
    pub display_name: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Change notification emitted after each apply.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A full `room_state` snapshot replaced the ephemeral maps.
    SnapshotApplied,
    /// A new connection epoch began; previous state was invalidated.
    EpochReset,
    PresenceChanged,
    CursorMoved { user_id: String },
    LocksChanged,
    ChatAppended(ChatMessage),
}

// ───────────────────────────────────────────────────────────────────
// RoomState — pure apply rules
// ───────────────────────────────────────────────────────────────────

/// The local view of one room: who is present, where their cursors are,
/// which fields they hold, and what has been said.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomState {
    presence: HashMap<String, PresenceEntry>,
    cursors: HashMap<String, CursorSample>,
    locks: HashMap<String, FieldLock>,
    chat: Vec<ChatMessage>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound frame and report what changed.
    pub fn apply(&mut self, msg: ServerMessage) -> RoomEvent {
        match msg {
            ServerMessage::RoomState(snapshot) => {
                self.replace_with(snapshot);
                RoomEvent::SnapshotApplied
            }

            ServerMessage::UserJoined(entry) => {
                // Keyed by user_id: a duplicate join replaces the entry
                // (display name refresh), it never accumulates.
                self.presence.insert(entry.user_id.clone(), entry);
                RoomEvent::PresenceChanged
            }

            ServerMessage::UserLeft { user_id } => {
                self.presence.remove(&user_id);
                self.cursors.remove(&user_id);
                // A departing user's locks are released implicitly —
                // an orphaned lock badge would block the field forever.
                self.locks.retain(|_, lock| lock.holder_user_id != user_id);
                RoomEvent::PresenceChanged
            }

            ServerMessage::CursorUpdate { user_id, position } => {
                self.cursors.insert(
                    user_id.clone(),
                    CursorSample {
                        position,
                        received_at: Utc::now(),
                    },
                );
                RoomEvent::CursorMoved { user_id }
            }

            ServerMessage::FieldFocus {
                user_id,
                display_name,
                field_id,
            } => {
                let holder_display_name = self.display_name_for(&user_id, display_name);
                self.locks.insert(
                    field_id.clone(),
                    FieldLock {
                        field_id,
                        holder_user_id: user_id,
                        holder_display_name,
                        acquired_at: Utc::now(),
                    },
                );
                RoomEvent::LocksChanged
            }

            ServerMessage::FieldBlur { user_id, field_id } => {
                // Only the current holder's blur releases the lock; a
                // late blur from a superseded holder is a no-op.
                if self
                    .locks
                    .get(&field_id)
                    .is_some_and(|lock| lock.holder_user_id == user_id)
                {
                    self.locks.remove(&field_id);
                }
                RoomEvent::LocksChanged
            }

            ServerMessage::ChatMessage {
                user_id,
                display_name,
                text,
            } => {
                let display_name = self.display_name_for(&user_id, display_name);
                let message = ChatMessage {
                    user_id,
                    display_name,
                    text,
                    received_at: Utc::now(),
                };
                self.chat.push(message.clone());
                RoomEvent::ChatAppended(message)
            }
        }
    }

    /// Atomic replace from a `room_state` frame. The chat log is not part
    /// of the snapshot and is left as-is.
    fn replace_with(&mut self, snapshot: RoomSnapshot) {
        let now = Utc::now();

        self.presence = snapshot
            .presence
            .into_iter()
            .map(|entry| (entry.user_id.clone(), entry))
            .collect();

        self.cursors = snapshot
            .cursors
            .into_iter()
            .map(|(user_id, position)| {
                (user_id, CursorSample { position, received_at: now })
            })
            .collect();

        self.locks = snapshot
            .locks
            .into_iter()
            .map(|(field_id, entry)| {
                let lock = FieldLock {
                    field_id: field_id.clone(),
                    holder_user_id: entry.user_id,
                    holder_display_name: entry.display_name,
                    acquired_at: entry.acquired_at,
                };
                (field_id, lock)
            })
            .collect();
    }

    /// Drop presence, cursors, and locks at the start of a new connection
    /// epoch. The incoming `room_state` is the sole source of truth from
    /// here on; the chat log stays (append-only, room-scoped).
    pub fn clear_ephemeral(&mut self) {
        self.presence.clear();
        self.cursors.clear();
        self.locks.clear();
    }

    /// Drop everything, chat included. Teardown only.
    pub fn clear_all(&mut self) {
        self.clear_ephemeral();
        self.chat.clear();
    }

    fn display_name_for(&self, user_id: &str, wire_name: String) -> String {
        if !wire_name.is_empty() {
            return wire_name;
        }
        self.presence
            .get(user_id)
            .map(|entry| entry.display_name.clone())
            .unwrap_or_else(|| user_id.to_owned())
    }

    // ── Read access (views are read-only) ────────────────────────

    pub fn presence(&self) -> &HashMap<String, PresenceEntry> {
        &self.presence
    }

    pub fn presence_count(&self) -> usize {
        self.presence.len()
    }

    pub fn cursors(&self) -> &HashMap<String, CursorSample> {
        &self.cursors
    }

    pub fn cursor(&self, user_id: &str) -> Option<&CursorSample> {
        self.cursors.get(user_id)
    }

    pub fn locks(&self) -> &HashMap<String, FieldLock> {
        &self.locks
    }

    /// Who currently holds the advisory lock on a field, if anyone.
    pub fn lock_holder(&self, field_id: &str) -> Option<&FieldLock> {
        self.locks.get(field_id)
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }
}

// ───────────────────────────────────────────────────────────────────
// RoomStore — shared handle with change notifications
// ───────────────────────────────────────────────────────────────────

/// Shared room state: written only by the connection's frame-apply loop,
/// read by any number of view adapters.
///
/// Change events fan out over a tokio broadcast channel so each adapter
/// subscribes independently; a lagging subscriber misses notifications,
/// not state — it re-reads the snapshot on its next event.
pub struct RoomStore {
    state: RwLock<RoomState>,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomStore {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            state: RwLock::new(RoomState::new()),
            events,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Apply one inbound frame and notify subscribers.
    pub async fn apply(&self, msg: ServerMessage) {
        let event = self.state.write().await.apply(msg);
        let _ = self.events.send(event);
    }

    /// Invalidate all previously held entities on entering a new
    /// connection epoch.
    pub async fn begin_epoch(&self) {
        self.state.write().await.clear_ephemeral();
        let _ = self.events.send(RoomEvent::EpochReset);
    }

    /// Discard everything at teardown.
    pub async fn clear(&self) {
        self.state.write().await.clear_all();
    }

    /// Clone the current state for rendering.
    pub async fn snapshot(&self) -> RoomState {
        self.state.read().await.clone()
    }

    /// Run a read-only closure against the current state without cloning.
    pub async fn read<R>(&self, f: impl FnOnce(&RoomState) -> R) -> R {
        f(&*self.state.read().await)
    }
}

// ===================================================================
// Tests
// ===================================================================
