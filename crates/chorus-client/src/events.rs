//! Framework-free event fan-out.
//!
//! Core components publish [`ClientEvent`]s on a broadcast channel; any
//! number of UI layers (or tests) subscribe.  Delivery is lossy for slow
//! receivers, which matches the refresh-on-next-render semantics the
//! events exist for.

use tokio::sync::broadcast;

use chorus_shared::types::{ConversationId, Message, MessageId, User, UserId};

use crate::realtime::ConnectionState;

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    UserRequested,
    /// Token refresh failed; the session is gone.
    SessionExpired,
}

/// Events published by the client core.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The realtime channel changed state.
    Connection(ConnectionState),
    /// A message landed in the cache (push or reconciled echo).
    MessageReceived {
        conversation_id: ConversationId,
        message: Message,
    },
    MessageEdited {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    MessageDeleted {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    PresenceChanged {
        user_id: UserId,
        online: bool,
    },
    TypingChanged {
        conversation_id: ConversationId,
        user_id: UserId,
        typing: bool,
    },
    /// Results of a debounced contact search.
    SearchResults {
        query: String,
        users: Vec<User>,
    },
    /// The session ended; the UI should navigate to its login surface.
    LoggedOut {
        reason: LogoutReason,
    },
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Cloneable handle to the broadcast channel.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Publish an event.  Having no subscribers is not an error.
    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event dropped: no subscribers");
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
