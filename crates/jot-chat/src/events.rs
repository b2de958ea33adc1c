//! Chat session event types

use jot_ai::{Message, MessageId};
use serde::Serialize;

use crate::error::ErrorNotice;

/// How a send/receive cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Done received (or the stream ended cleanly)
    Finalized,
    /// Stopped by the user
    Aborted,
    /// Transport or backend error
    Failed,
}

/// Events emitted while a request runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// User message and placeholder appended
    RequestStart { user: Message, placeholder: Message },

    /// In-flight message changed
    MessageUpdate { message: Message },

    /// In-flight message finalized
    MessageEnd { message: Message },

    /// In-flight message dropped (empty reply, or aborted/failed with nothing to keep)
    MessageRemoved { id: MessageId },

    /// Error for the banner
    Error { notice: ErrorNotice },

    /// Cycle finished; the token has been released
    RequestEnd { id: MessageId, outcome: RequestOutcome },
}

impl ChatEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::RequestEnd { .. })
    }
}
