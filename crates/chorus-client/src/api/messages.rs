use serde_json::json;

use chorus_shared::types::{ConversationId, Message, MessageId};

use crate::api::ApiClient;
use crate::error::Result;

impl ApiClient {
    /// Fetch one page of messages, ascending `created_at`.
    ///
    /// With `before` set, the page contains strictly older messages than
    /// the given id; without it, the latest page.
    pub async fn fetch_messages(
        &self,
        conversation: ConversationId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }
        self.get_json(&format!("/messages/{conversation}"), &query)
            .await
    }

    /// Pin or unpin a message.  Returns the updated message.
    pub async fn pin_message(
        &self,
        conversation: ConversationId,
        message: MessageId,
        pinned: bool,
    ) -> Result<Message> {
        self.post_json(
            &format!("/messages/{conversation}/{message}/pin"),
            &json!({ "pinned": pinned }),
        )
        .await
    }
}
