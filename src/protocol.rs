//! Tagged JSON wire protocol for the collaboration channel.
//!
//! Every frame is a UTF-8 JSON text message with a flat envelope:
//!
//! ```text
//! { "type": "<tag>", ...payload }
//! ```
//!
//! Inbound tags:  room_state, user_joined, user_left, cursor_update,
//!                field_focus, field_blur, chat_message
//! Outbound tags: cursor_move, field_focus, field_blur, field_change, chat
//!
//! Two envelope rules keep old clients alive against new servers:
//!
//! - An unknown `type` is dropped silently ([`ProtocolError::UnknownTag`]),
//!   never treated as a fault.
//! - A malformed frame (non-JSON, or a known tag with a bad payload) is
//!   dropped and logged ([`ProtocolError::Malformed`]); it does not tear
//!   down the connection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ───────────────────────────────────────────────────────────────────
// Identity types
// ───────────────────────────────────────────────────────────────────

/// Compound key identifying the shared editing context.
///
/// `room_type` is an open string enum interpreted by the server
/// (`form_edit`, `dashboard`, ...). Both parts must be non-empty for a
/// connection to be attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomIdentity {
    pub room_type: String,
    pub room_id: String,
}

impl RoomIdentity {
    pub fn new(room_type: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            room_type: room_type.into(),
            room_id: room_id.into(),
        }
    }

    /// A room with a blank type or id is not connectable. This is a
    /// normal outcome (a view rendered before its route params resolve),
    /// not a fault.
    pub fn is_valid(&self) -> bool {
        !self.room_type.trim().is_empty() && !self.room_id.trim().is_empty()
    }
}

/// Caller-supplied participant identity.
///
/// `user_id` is the dedup key; `display_name` is presentation-only and
/// may change without an identity change. Authentication is the host
/// application's concern — both values are opaque here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Wire payload types
// ───────────────────────────────────────────────────────────────────

/// 2D cursor position in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPoint {
    pub x: f64,
    pub y: f64,
}

impl CursorPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One participant currently present in the room.
///
/// `connected_since` is RFC 3339 on the wire; servers that omit it get
/// the local arrival time instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: String,
    pub display_name: String,
    #[serde(default = "Utc::now")]
    pub connected_since: DateTime<Utc>,
}

/// Advisory lock on a single editable field, as carried in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "Utc::now")]
    pub acquired_at: DateTime<Utc>,
}

/// Full room state delivered on connect/reconnect.
///
/// The receiver must replace its presence/cursor/lock maps with this —
/// never merge — so nothing from a previous connection epoch survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSnapshot {
    pub presence: Vec<PresenceEntry>,
    pub cursors: HashMap<String, CursorPoint>,
    pub locks: HashMap<String, LockEntry>,
}

// ───────────────────────────────────────────────────────────────────
// Inbound frames
// ───────────────────────────────────────────────────────────────────

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authoritative full state, sent once per connection epoch.
    RoomState(RoomSnapshot),

    /// A participant joined (or re-announced — apply is idempotent).
    UserJoined(PresenceEntry),

    /// A participant left; their cursor and locks go with them.
    #[serde(rename_all = "camelCase")]
    UserLeft { user_id: String },

    /// Cursor sample; the server attaches the sender's id.
    #[serde(rename_all = "camelCase")]
    CursorUpdate {
        user_id: String,
        position: CursorPoint,
    },

    /// Server-serialized broadcast of an advisory lock acquisition.
    #[serde(rename_all = "camelCase")]
    FieldFocus {
        user_id: String,
        #[serde(default)]
        display_name: String,
        field_id: String,
    },

    /// Server-serialized broadcast of an advisory lock release.
    #[serde(rename_all = "camelCase")]
    FieldBlur { user_id: String, field_id: String },

    /// Room-scoped chat line.
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        user_id: String,
        #[serde(default)]
        display_name: String,
        #[serde(alias = "message")]
        text: String,
    },
}

/// Tags this client understands. Anything else is a newer server
/// speaking a newer dialect — dropped without complaint.
const INBOUND_TAGS: &[&str] = &[
    "room_state",
    "user_joined",
    "user_left",
    "cursor_update",
    "field_focus",
    "field_blur",
    "chat_message",
];

impl ServerMessage {
    /// Decode one inbound text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed("missing `type` tag".into()))?;

        if !INBOUND_TAGS.contains(&tag) {
            return Err(ProtocolError::UnknownTag(tag.to_owned()));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

// ───────────────────────────────────────────────────────────────────
// Outbound frames
// ───────────────────────────────────────────────────────────────────

/// Client → server intents.
///
/// The client never attaches its own identity — the server knows the
/// sender from the connection's query string and stamps `userId` onto
/// its broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Throttled cursor sample (client→server alias of `cursor_update`).
    CursorMove { position: CursorPoint },

    /// Request an advisory lock on a field.
    #[serde(rename_all = "camelCase")]
    FieldFocus { field_id: String },

    /// Release an advisory lock on a field.
    #[serde(rename_all = "camelCase")]
    FieldBlur { field_id: String },

    /// Broadcast an edit for optimistic reflection on other clients.
    /// Not authoritative persistence — that belongs to the forms service.
    #[serde(rename_all = "camelCase")]
    FieldChange { field_id: String, value: Value },

    /// Chat line.
    Chat { message: String },
}

impl ClientMessage {
    /// Encode to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

// ───────────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────────

/// Codec faults. None of these are fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Non-JSON frame, or a known tag with an unusable payload.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// A tag this client does not understand (forward compatibility).
    #[error("unknown frame tag `{0}`")]
    UnknownTag(String),
    /// An outbound intent failed to serialize.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Inbound decoding ─────────────────────────────────────────

    #[test]
    fn test_decode_room_state() {
        let text = r#"{
            "type": "room_state",
            "presence": [
                {"userId": "u1", "displayName": "Ada", "connectedSince": "2026-01-05T10:00:00Z"}
            ],
            "cursors": {"u1": {"x": 10.0, "y": 20.0}},
            "locks": {"q3": {"userId": "u1", "displayName": "Ada"}}
        }"#;

        let msg = ServerMessage::decode(text).unwrap();
        match msg {
            ServerMessage::RoomState(snap) => {
                assert_eq!(snap.presence.len(), 1);
                assert_eq!(snap.presence[0].user_id, "u1");
                assert_eq!(snap.presence[0].display_name, "Ada");
                assert_eq!(snap.cursors["u1"], CursorPoint::new(10.0, 20.0));
                assert_eq!(snap.locks["q3"].user_id, "u1");
            }
            other => panic!("expected RoomState, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_room_state_empty_payload() {
        // A bare snapshot is valid: every collection defaults to empty.
        let msg = ServerMessage::decode(r#"{"type": "room_state"}"#).unwrap();
        match msg {
            ServerMessage::RoomState(snap) => {
                assert!(snap.presence.is_empty());
                assert!(snap.cursors.is_empty());
                assert!(snap.locks.is_empty());
            }
            other => panic!("expected RoomState, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_user_joined() {
        let msg = ServerMessage::decode(
            r#"{"type": "user_joined", "userId": "b", "displayName": "Bob"}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::UserJoined(entry) => {
                assert_eq!(entry.user_id, "b");
                assert_eq!(entry.display_name, "Bob");
                // connectedSince omitted — defaulted to local arrival time.
                assert!(entry.connected_since <= Utc::now());
            }
            other => panic!("expected UserJoined, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_user_left() {
        let msg = ServerMessage::decode(r#"{"type": "user_left", "userId": "b"}"#).unwrap();
        assert_eq!(msg, ServerMessage::UserLeft { user_id: "b".into() });
    }

    #[test]
    fn test_decode_cursor_update() {
        let msg = ServerMessage::decode(
            r#"{"type": "cursor_update", "userId": "b", "position": {"x": 10, "y": 20}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::CursorUpdate {
                user_id: "b".into(),
                position: CursorPoint::new(10.0, 20.0),
            }
        );
    }

    #[test]
    fn test_decode_field_focus_and_blur() {
        let focus = ServerMessage::decode(
            r#"{"type": "field_focus", "userId": "b", "displayName": "Bob", "fieldId": "q2"}"#,
        )
        .unwrap();
        assert_eq!(
            focus,
            ServerMessage::FieldFocus {
                user_id: "b".into(),
                display_name: "Bob".into(),
                field_id: "q2".into(),
            }
        );

        let blur =
            ServerMessage::decode(r#"{"type": "field_blur", "userId": "b", "fieldId": "q2"}"#)
                .unwrap();
        assert_eq!(
            blur,
            ServerMessage::FieldBlur {
                user_id: "b".into(),
                field_id: "q2".into(),
            }
        );
    }

    #[test]
    fn test_decode_chat_message() {
        let msg = ServerMessage::decode(
            r#"{"type": "chat_message", "userId": "b", "displayName": "Bob", "text": "hello"}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::ChatMessage { user_id, text, .. } => {
                assert_eq!(user_id, "b");
                assert_eq!(text, "hello");
            }
            other => panic!("expected ChatMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_chat_message_accepts_message_key() {
        // Some server builds send `message` instead of `text`.
        let msg = ServerMessage::decode(
            r#"{"type": "chat_message", "userId": "b", "message": "hi"}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::ChatMessage { text, .. } => assert_eq!(text, "hi"),
            other => panic!("expected ChatMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_tag_is_not_malformed() {
        let err = ServerMessage::decode(r#"{"type": "server_metrics", "load": 0.4}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownTag("server_metrics".into()));
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = ServerMessage::decode("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_missing_tag() {
        let err = ServerMessage::decode(r#"{"userId": "b"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_known_tag_bad_payload() {
        // Known tag, wrong payload shape: malformed, not unknown.
        let err = ServerMessage::decode(r#"{"type": "user_left"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    // ── Outbound encoding ────────────────────────────────────────

    #[test]
    fn test_encode_cursor_move_shape() {
        let text = ClientMessage::CursorMove {
            position: CursorPoint::new(3.5, 7.0),
        }
        .encode()
        .unwrap();

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"type": "cursor_move", "position": {"x": 3.5, "y": 7.0}})
        );
    }

    #[test]
    fn test_encode_field_frames_shape() {
        let focus = ClientMessage::FieldFocus { field_id: "q1".into() }.encode().unwrap();
        let value: Value = serde_json::from_str(&focus).unwrap();
        assert_eq!(value, json!({"type": "field_focus", "fieldId": "q1"}));

        let blur = ClientMessage::FieldBlur { field_id: "q1".into() }.encode().unwrap();
        let value: Value = serde_json::from_str(&blur).unwrap();
        assert_eq!(value, json!({"type": "field_blur", "fieldId": "q1"}));

        let change = ClientMessage::FieldChange {
            field_id: "q1".into(),
            value: json!({"answer": 42}),
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&change).unwrap();
        assert_eq!(
            value,
            json!({"type": "field_change", "fieldId": "q1", "value": {"answer": 42}})
        );
    }

    #[test]
    fn test_encode_chat_shape() {
        let text = ClientMessage::Chat { message: "hello".into() }.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "chat", "message": "hello"}));
    }

    // ── Identity types ───────────────────────────────────────────

    #[test]
    fn test_room_identity_validity() {
        assert!(RoomIdentity::new("form_edit", "f-123").is_valid());
        assert!(!RoomIdentity::new("", "f-123").is_valid());
        assert!(!RoomIdentity::new("form_edit", "").is_valid());
        assert!(!RoomIdentity::new("form_edit", "   ").is_valid());
    }
}
