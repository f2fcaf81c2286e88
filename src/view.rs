//! Render-ready projections of room state.
//!
//! Pure builders: each takes a [`RoomState`] snapshot and returns plain
//! data for the UI layer (avatar strip, cursor overlay, lock badges,
//! chat panel). No builder mutates anything or talks to the network —
//! the store is read-only from here.

use chrono::{DateTime, Utc};

use crate::presence::ParticipantColor;
use crate::protocol::CursorPoint;
use crate::room::RoomState;

// ───────────────────────────────────────────────────────────────────
// Presence avatars
// ───────────────────────────────────────────────────────────────────

/// One avatar in the "who's here" strip.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceAvatar {
    pub user_id: String,
    pub display_name: String,
    /// Up to two uppercase initials for the avatar circle.
    pub initials: String,
    pub color: ParticipantColor,
    pub connected_since: DateTime<Utc>,
}

/// Avatars ordered by join time (ties broken by id, so the strip is
/// stable across re-renders).
pub fn build_presence_avatars(state: &RoomState) -> Vec<PresenceAvatar> {
    let mut avatars: Vec<PresenceAvatar> = state
        .presence()
        .values()
        .map(|entry| PresenceAvatar {
            user_id: entry.user_id.clone(),
            display_name: entry.display_name.clone(),
            initials: initials(&entry.display_name),
            color: ParticipantColor::from_user_id(&entry.user_id),
            connected_since: entry.connected_since,
        })
        .collect();
    avatars.sort_by(|a, b| {
        a.connected_since
            .cmp(&b.connected_since)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    avatars
}

// ───────────────────────────────────────────────────────────────────
// Cursor overlays
// ───────────────────────────────────────────────────────────────────

/// One remote cursor to draw over the editing surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorOverlay {
    pub user_id: String,
    pub display_name: String,
    pub position: CursorPoint,
    pub color: ParticipantColor,
}

/// Remote cursors, the local participant excluded. Display names come
/// from presence; a cursor from a user whose join frame has not arrived
/// yet falls back to the raw id.
pub fn build_cursor_overlays(state: &RoomState, local_user_id: &str) -> Vec<CursorOverlay> {
    let mut overlays: Vec<CursorOverlay> = state
        .cursors()
        .iter()
        .filter(|(user_id, _)| user_id.as_str() != local_user_id)
        .map(|(user_id, sample)| CursorOverlay {
            user_id: user_id.clone(),
            display_name: state
                .presence()
                .get(user_id)
                .map_or_else(|| user_id.clone(), |entry| entry.display_name.clone()),
            position: sample.position,
            color: ParticipantColor::from_user_id(user_id),
        })
        .collect();
    overlays.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    overlays
}

// ───────────────────────────────────────────────────────────────────
// Lock badges
// ───────────────────────────────────────────────────────────────────

/// Advisory-lock indicator for one field. Indication only — the badge
/// never disables the input.
#[derive(Debug, Clone, PartialEq)]
pub struct LockBadge {
    pub field_id: String,
    pub holder_display_name: String,
    pub held_by_self: bool,
}

pub fn build_lock_badges(state: &RoomState, local_user_id: &str) -> Vec<LockBadge> {
    let mut badges: Vec<LockBadge> = state
        .locks()
        .values()
        .map(|lock| LockBadge {
            field_id: lock.field_id.clone(),
            holder_display_name: lock.holder_display_name.clone(),
            held_by_self: lock.holder_user_id == local_user_id,
        })
        .collect();
    badges.sort_by(|a, b| a.field_id.cmp(&b.field_id));
    badges
}

// ───────────────────────────────────────────────────────────────────
// Chat panel
// ───────────────────────────────────────────────────────────────────

/// One line in the chat panel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub author: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub color: ParticipantColor,
}

/// Chat lines in arrival order.
pub fn build_chat_lines(state: &RoomState) -> Vec<ChatLine> {
    state
        .chat()
        .iter()
        .map(|message| ChatLine {
            author: message.display_name.clone(),
            text: message.text.clone(),
            received_at: message.received_at,
            color: ParticipantColor::from_user_id(&message.user_id),
        })
        .collect()
}

fn initials(display_name: &str) -> String {
    let mut letters = display_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase);

    match (letters.next(), letters.next()) {
        (Some(first), Some(second)) => format!("{first}{second}"),
        (Some(first), None) => first.to_string(),
        _ => "?".to_owned(),
    }
}

// ===================================================================
// Tests
// ===================================================================
