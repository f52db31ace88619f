use serde_json::json;

use chorus_shared::types::{Conversation, ConversationId, MemberRole, UserId};

use crate::api::ApiClient;
use crate::error::Result;

impl ApiClient {
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.get_json("/conversations", &[]).await
    }

    pub async fn fetch_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.get_json(&format!("/conversations/{id}"), &[]).await
    }

    /// Open (or return the existing) direct conversation with a user.
    pub async fn open_dm(&self, user: UserId) -> Result<Conversation> {
        self.post_json("/conversations", &json!({ "participant": user }))
            .await
    }

    pub async fn create_group(&self, name: &str, members: &[UserId]) -> Result<Conversation> {
        self.post_json(
            "/conversations/group",
            &json!({ "name": name, "members": members }),
        )
        .await
    }

    pub async fn add_member(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<Conversation> {
        self.post_json(
            &format!("/conversations/{conversation}/members"),
            &json!({ "user_id": user }),
        )
        .await
    }

    pub async fn remove_member(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<Conversation> {
        self.delete_json(&format!("/conversations/{conversation}/members/{user}"))
            .await
    }

    pub async fn set_member_role(
        &self,
        conversation: ConversationId,
        user: UserId,
        role: MemberRole,
    ) -> Result<Conversation> {
        self.post_json(
            &format!("/conversations/{conversation}/members/{user}/role"),
            &json!({ "role": role }),
        )
        .await
    }

    pub async fn leave_conversation(&self, conversation: ConversationId) -> Result<()> {
        self.post_empty(&format!("/conversations/{conversation}/leave"), &json!({}))
            .await
    }

    /// Join a group using a self-contained invite token.  The server
    /// re-validates; local validation is a cache of its truth.
    pub async fn join_with_invite(&self, token: &str) -> Result<Conversation> {
        self.post_json("/conversations/join", &json!({ "token": token }))
            .await
    }
}
