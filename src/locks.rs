//! Advisory field locks: collision hints, not mutual exclusion.
//!
//! The coordinator sends focus/blur intents and projects whatever lock
//! state the room store currently holds. It asserts no local authority:
//! a successful `field_focus` send never implies exclusive access, and
//! the "locked by someone else" answer is a UI indication, never an
//! input gate. Authoritative conflict resolution belongs to the forms
//! persistence service; strengthening the guarantee here would only
//! fake a safety the server cannot back up.

use serde_json::Value;

use crate::connection::Outbound;
use crate::protocol::ClientMessage;
use crate::room::{FieldLock, RoomState};

pub struct FieldLockCoordinator {
    outbound: Outbound,
    local_user_id: String,
}

impl FieldLockCoordinator {
    pub(crate) fn new(outbound: Outbound, local_user_id: String) -> Self {
        Self {
            outbound,
            local_user_id,
        }
    }

    /// Request the advisory lock for a field (on focus).
    pub fn focus(&self, field_id: &str) -> bool {
        self.outbound.send(&ClientMessage::FieldFocus {
            field_id: field_id.to_owned(),
        })
    }

    /// Release the advisory lock for a field (on blur).
    pub fn blur(&self, field_id: &str) -> bool {
        self.outbound.send(&ClientMessage::FieldBlur {
            field_id: field_id.to_owned(),
        })
    }

    /// Broadcast an edit so other clients can reflect it optimistically.
    /// This is not persistence.
    pub fn broadcast_change(&self, field_id: &str, value: Value) -> bool {
        self.outbound.send(&ClientMessage::FieldChange {
            field_id: field_id.to_owned(),
            value,
        })
    }

    /// The current holder of a field's lock, as the store sees it.
    pub fn holder<'a>(&self, state: &'a RoomState, field_id: &str) -> Option<&'a FieldLock> {
        state.lock_holder(field_id)
    }

    /// Whether someone other than the local participant holds the lock.
    pub fn is_locked_by_other(&self, state: &RoomState, field_id: &str) -> bool {
        state
            .lock_holder(field_id)
            .is_some_and(|lock| lock.holder_user_id != self.local_user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::protocol::ServerMessage;
    use serde_json::json;
    use tokio::sync::{mpsc, watch};

    fn coordinator() -> (FieldLockCoordinator, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        // The watch sender may drop; receivers keep the last value.
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        (
            FieldLockCoordinator::new(Outbound::new(tx, state_rx), "me".into()),
            rx,
        )
    }

    fn focused(state: &mut RoomState, user_id: &str, field_id: &str) {
        state.apply(ServerMessage::FieldFocus {
            user_id: user_id.into(),
            display_name: user_id.to_uppercase(),
            field_id: field_id.into(),
        });
    }

    #[test]
    fn test_focus_and_blur_emit_intents() {
        let (coordinator, mut rx) = coordinator();

        assert!(coordinator.focus("q1"));
        assert!(coordinator.blur("q1"));

        let focus: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(focus, json!({"type": "field_focus", "fieldId": "q1"}));
        let blur: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(blur, json!({"type": "field_blur", "fieldId": "q1"}));
    }

    #[test]
    fn test_change_broadcast_carries_value() {
        let (coordinator, mut rx) = coordinator();

        assert!(coordinator.broadcast_change("q2", json!({"rating": 5})));
        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"type": "field_change", "fieldId": "q2", "value": {"rating": 5}})
        );
    }

    #[test]
    fn test_locked_by_other_distinguishes_holder() {
        let (coordinator, _rx) = coordinator();
        let mut state = RoomState::new();

        assert!(!coordinator.is_locked_by_other(&state, "q1"));

        focused(&mut state, "someone-else", "q1");
        assert!(coordinator.is_locked_by_other(&state, "q1"));
        assert_eq!(coordinator.holder(&state, "q1").unwrap().holder_user_id, "someone-else");

        focused(&mut state, "me", "q1");
        assert!(!coordinator.is_locked_by_other(&state, "q1"));
    }
}
