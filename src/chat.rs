//! Room-scoped chat: validated local send, ordered inbound log.
//!
//! The relay owns only the outbound half; inbound `chat_message` frames
//! append to the store's chat log in arrival order. There is no dedup,
//! no delivery acknowledgment, and no retry of unsent messages across a
//! reconnect — a message composed while disconnected is simply not
//! sendable, and the UI is expected to disable the input using the
//! connection-state signal.

use crate::connection::Outbound;
use crate::protocol::ClientMessage;

pub struct ChatRelay {
    outbound: Outbound,
}

impl ChatRelay {
    pub(crate) fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }

    /// Send one chat line.
    ///
    /// A no-op (not an error) when the text is blank or the connection
    /// is not up. Returns whether a frame was handed to the writer.
    pub fn send(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.outbound.send(&ClientMessage::Chat {
            message: text.to_owned(),
        })
    }
}
