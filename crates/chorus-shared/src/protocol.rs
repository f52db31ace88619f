//! JSON wire protocol for the realtime push channel.
//!
//! Frames travel as WebSocket text messages. The `type` tag mirrors the
//! backend's event names so the same frames can be logged and replayed
//! against a live server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_MESSAGE_SIZE;
use crate::error::ProtocolError;
use crate::types::{ConversationId, Message, MessageId, MessageKind, UserId};

/// Frames sent client -> server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinConversation {
        conversation_id: ConversationId,
    },
    LeaveConversation {
        conversation_id: ConversationId,
    },
    SendMessage {
        conversation_id: ConversationId,
        /// Client-generated id, echoed back by the server for dedupe.
        message_id: MessageId,
        kind: MessageKind,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<MessageId>,
        created_at: DateTime<Utc>,
    },
    EditMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
    },
    DeleteMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    Typing {
        conversation_id: ConversationId,
    },
    StopTyping {
        conversation_id: ConversationId,
    },
}

/// Frames received server -> client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    NewMessage {
        message: Message,
    },
    MessageEdited {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
        edited_at: DateTime<Utc>,
    },
    MessageDeleted {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    Presence {
        user_id: UserId,
        online: bool,
        at: DateTime<Utc>,
    },
    Typing {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    StopTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let json = serde_json::to_string(self)?;
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge(json.len()));
        }
        Ok(json)
    }

    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }
}
