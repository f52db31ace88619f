//! Conversation and messaging operations.
//!
//! REST fetches fill the cache; sends go over the push channel with an
//! optimistic local insert first, reconciled when the server echo comes
//! back (see [`ChatCache`]).  Edits and deletes mutate the cache in place
//! and mirror the change to the server.

use std::sync::Arc;

use chrono::Utc;

use chorus_shared::constants::MAX_MESSAGE_SIZE;
use chorus_shared::protocol::ClientFrame;
use chorus_shared::types::{
    Conversation, ConversationId, MemberRole, Message, MessageId, MessageKind, UserId,
};

use crate::api::ApiClient;
use crate::cache::ChatCache;
use crate::error::{ClientError, Result};
use crate::invites::{InviteRegistry, InviteValidation};
use crate::realtime::RealtimeHandle;
use crate::users::UserDirectory;

pub struct Chats {
    api: Arc<ApiClient>,
    cache: Arc<ChatCache>,
    realtime: Arc<RealtimeHandle>,
    users: Arc<UserDirectory>,
    page_size: u32,
}

impl Chats {
    pub fn new(
        api: Arc<ApiClient>,
        cache: Arc<ChatCache>,
        realtime: Arc<RealtimeHandle>,
        users: Arc<UserDirectory>,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            cache,
            realtime,
            users,
            page_size,
        }
    }

    // -----------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------

    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>> {
        let conversations = self.api.list_conversations().await?;
        self.cache.upsert_conversations(conversations.clone());
        Ok(conversations)
    }

    /// Open (or resume) a direct conversation and start receiving its
    /// push events.
    pub async fn open_dm(&self, user: UserId) -> Result<Conversation> {
        let conversation = self.api.open_dm(user).await?;
        self.cache.upsert_conversation(conversation.clone());
        self.realtime.join_conversation(conversation.id).await?;
        Ok(conversation)
    }

    pub async fn create_group(&self, name: &str, members: &[UserId]) -> Result<Conversation> {
        if name.trim().is_empty() {
            return Err(ClientError::Validation("group name is empty".into()));
        }
        let conversation = self.api.create_group(name, members).await?;
        self.cache.upsert_conversation(conversation.clone());
        self.realtime.join_conversation(conversation.id).await?;
        Ok(conversation)
    }

    pub async fn add_member(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<Conversation> {
        let updated = self.api.add_member(conversation, user).await?;
        self.cache.upsert_conversation(updated.clone());
        Ok(updated)
    }

    pub async fn remove_member(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<Conversation> {
        let updated = self.api.remove_member(conversation, user).await?;
        self.cache.upsert_conversation(updated.clone());
        Ok(updated)
    }

    pub async fn set_member_role(
        &self,
        conversation: ConversationId,
        user: UserId,
        role: MemberRole,
    ) -> Result<Conversation> {
        let updated = self.api.set_member_role(conversation, user, role).await?;
        self.cache.upsert_conversation(updated.clone());
        Ok(updated)
    }

    /// Leave a group.  The conversation stays cached (deletion is
    /// server-authoritative); we just stop receiving its events.
    pub async fn leave_group(&self, conversation: ConversationId) -> Result<()> {
        self.api.leave_conversation(conversation).await?;
        self.realtime.leave_conversation(conversation).await?;
        Ok(())
    }

    /// Validate an invite locally, then join through the server.
    pub async fn join_with_invite(
        &self,
        invites: &InviteRegistry,
        token: &str,
    ) -> Result<Conversation> {
        match invites.validate(token)? {
            InviteValidation::Valid(_) => {}
            rejected => {
                return Err(ClientError::Validation(format!(
                    "invite is {}",
                    rejected.reason().unwrap_or("invalid")
                )));
            }
        }
        let conversation = self.api.join_with_invite(token).await?;
        self.cache.upsert_conversation(conversation.clone());
        self.realtime.join_conversation(conversation.id).await?;
        Ok(conversation)
    }

    // -----------------------------------------------------------------
    // Message history
    // -----------------------------------------------------------------

    /// Fetch the latest page, replacing the cached tail.
    pub async fn load_latest(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let page = self
            .api
            .fetch_messages(conversation, None, self.page_size)
            .await?;
        self.cache
            .store_latest_page(conversation, page.clone(), self.page_size);
        Ok(page)
    }

    /// Page backward: fetch strictly older messages and prepend them.
    pub async fn load_older(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let Some(before) = self.cache.oldest_message_id(conversation) else {
            return self.load_latest(conversation).await;
        };
        if !self.cache.has_more(conversation) {
            return Ok(Vec::new());
        }
        let page = self
            .api
            .fetch_messages(conversation, Some(before), self.page_size)
            .await?;
        self.cache
            .prepend_older_page(conversation, page.clone(), self.page_size);
        Ok(page)
    }

    pub fn messages(&self, conversation: ConversationId) -> Vec<Message> {
        self.cache.messages(conversation)
    }

    pub fn has_more(&self, conversation: ConversationId) -> bool {
        self.cache.has_more(conversation)
    }

    // -----------------------------------------------------------------
    // Sending and mutating
    // -----------------------------------------------------------------

    pub async fn send_text(
        &self,
        conversation: ConversationId,
        content: impl Into<String>,
    ) -> Result<Message> {
        self.send(conversation, MessageKind::Text, content.into(), None)
            .await
    }

    /// Send a message: optimistic insert first, then the frame.  While the
    /// channel is down the frame is buffered and flushed on reconnect; the
    /// cache entry collapses with the server echo either way.
    pub async fn send(
        &self,
        conversation: ConversationId,
        kind: MessageKind,
        content: String,
        reply_to: Option<MessageId>,
    ) -> Result<Message> {
        if content.is_empty() {
            return Err(ClientError::Validation("message is empty".into()));
        }
        if content.len() > MAX_MESSAGE_SIZE {
            return Err(ClientError::Validation("message is too large".into()));
        }

        let me = self.users.me().await?;
        let message = Message {
            id: MessageId::new(),
            conversation_id: conversation,
            sender: me.id,
            kind,
            content,
            reply_to,
            created_at: Utc::now(),
            edited_at: None,
            deleted: false,
            pinned: false,
        };

        self.cache.insert_optimistic(message.clone());
        self.realtime
            .send_frame(ClientFrame::SendMessage {
                conversation_id: conversation,
                message_id: message.id,
                kind,
                content: message.content.clone(),
                reply_to,
                created_at: message.created_at,
            })
            .await?;
        Ok(message)
    }

    /// Upload media, then send a message referencing it.
    pub async fn send_media(
        &self,
        conversation: ConversationId,
        kind: MessageKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Message> {
        if matches!(kind, MessageKind::Text) {
            return Err(ClientError::Validation(
                "media messages must be image or file".into(),
            ));
        }
        let media = self.api.upload_media(file_name, bytes).await?;
        self.send(conversation, kind, media.id, None).await
    }

    pub async fn edit(
        &self,
        conversation: ConversationId,
        message: MessageId,
        content: String,
    ) -> Result<()> {
        if content.is_empty() {
            return Err(ClientError::Validation("message is empty".into()));
        }
        self.cache
            .apply_edit(conversation, message, content.clone(), Utc::now());
        self.realtime
            .send_frame(ClientFrame::EditMessage {
                conversation_id: conversation,
                message_id: message,
                content,
            })
            .await
    }

    /// Soft-delete: the cached entry is flagged, never removed.
    pub async fn delete(&self, conversation: ConversationId, message: MessageId) -> Result<()> {
        self.cache.apply_delete(conversation, message);
        self.realtime
            .send_frame(ClientFrame::DeleteMessage {
                conversation_id: conversation,
                message_id: message,
            })
            .await
    }

    pub async fn pin(
        &self,
        conversation: ConversationId,
        message: MessageId,
        pinned: bool,
    ) -> Result<Message> {
        let updated = self.api.pin_message(conversation, message, pinned).await?;
        self.cache.apply_pin(conversation, message, updated.pinned);
        Ok(updated)
    }

    pub async fn typing(&self, conversation: ConversationId) -> Result<()> {
        self.realtime.typing(conversation).await
    }

    pub async fn stop_typing(&self, conversation: ConversationId) -> Result<()> {
        self.realtime.stop_typing(conversation).await
    }
}
