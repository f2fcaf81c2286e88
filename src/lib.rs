//! # canvass-collab — real-time collaboration sync for Canvass
//!
//! Keeps concurrent editors of the same resource (a survey form, a
//! dashboard) aware of each other: who is present, where their cursors
//! are, which fields are being edited, plus a lightweight room chat —
//! over one reconnecting WebSocket per room.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌────────────────────┐   JSON text frames
//!  user actions ───► │   CollabSession    │ ◄──────────────────► server
//!  (cursor, focus,   │  ┌──────────────┐  │
//!   edit, chat)      │  │  Supervisor  │  │  connect / reconnect /
//!                    │  │ (owns socket)│  │  teardown state machine
//!                    │  └──────┬───────┘  │
//!                    └─────────┼──────────┘
//!                              ▼ apply, in arrival order
//!                       ┌─────────────┐
//!                       │  RoomStore  │  presence · cursors · locks · chat
//!                       └──────┬──────┘
//!                              ▼ snapshots + change events
//!                        view adapters (avatars, overlays,
//!                        lock badges, chat panel)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — tagged JSON wire envelopes and payload types
//! - [`connection`] — socket lifecycle, reconnect loop, outbound gating
//! - [`room`] — the local room projection and its apply rules
//! - [`session`] — the user-facing session facade
//! - [`presence`] — throttled cursor broadcasting, participant colors
//! - [`locks`] — advisory field locks (hints, not mutual exclusion)
//! - [`chat`] — room-scoped chat relay
//! - [`view`] — pure render-ready projections
//!
//! ## Guarantees (and non-guarantees)
//!
//! Frames apply in per-connection-epoch FIFO order; there is no global
//! ordering across users, and field locks converge eventually rather
//! than consistently. Every fault either self-heals (reconnect) or is
//! silently absorbed (dropped frame, gated send) — this layer is
//! best-effort presence on top of a separately persisted data model.

pub mod chat;
pub mod connection;
pub mod locks;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod session;
pub mod view;

// Re-exports for convenience
pub use chat::ChatRelay;
pub use connection::{endpoint_url, CollabConfig, CollabError, ConnectionState};
pub use locks::FieldLockCoordinator;
pub use presence::{CursorBroadcaster, CursorTracker, ParticipantColor};
pub use protocol::{
    ClientMessage, CursorPoint, LockEntry, Participant, PresenceEntry, ProtocolError,
    RoomIdentity, RoomSnapshot, ServerMessage,
};
pub use room::{ChatMessage, CursorSample, FieldLock, RoomEvent, RoomState, RoomStore};
pub use session::CollabSession;
pub use view::{
    build_chat_lines, build_cursor_overlays, build_lock_badges, build_presence_avatars,
    ChatLine, CursorOverlay, LockBadge, PresenceAvatar,
};
