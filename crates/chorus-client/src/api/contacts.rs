use serde::{Deserialize, Serialize};
use serde_json::json;

use chorus_shared::types::{Conversation, ConversationId, User};

use crate::api::ApiClient;
use crate::error::Result;

/// Relationship flags a user can set on a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipFlag {
    Archived,
    Muted,
    Pinned,
    Favorited,
    Blocked,
}

#[derive(Debug, Deserialize)]
struct Availability {
    available: bool,
}

impl ApiClient {
    pub async fn fetch_contacts(&self) -> Result<Vec<User>> {
        self.get_json("/users/contacts", &[]).await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        self.get_json("/users/search", &[("q", query.to_string())])
            .await
    }

    /// Toggle a relationship flag.  Returns the updated conversation.
    pub async fn set_relationship_flag(
        &self,
        conversation: ConversationId,
        flag: RelationshipFlag,
        value: bool,
    ) -> Result<Conversation> {
        self.post_json(
            "/users/relationships",
            &json!({
                "conversation_id": conversation,
                "flag": flag,
                "value": value,
            }),
        )
        .await
    }

    pub async fn check_username(&self, username: &str) -> Result<bool> {
        let availability: Availability = self
            .get_json(
                "/users/username-available",
                &[("username", username.to_string())],
            )
            .await?;
        Ok(availability.available)
    }
}
