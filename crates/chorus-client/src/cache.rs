//! Client-side cache of conversations and message pages.
//!
//! The cache is a best-effort, non-authoritative mirror of server state:
//! it must tolerate being stale or wrong.  Within a conversation, messages
//! are kept in ascending `created_at` order; pagination prepends strictly
//! older pages.  Edits, deletes and pins flag entries in place so the UI
//! can render markers consistently with the server's soft-delete model.
//!
//! Push events apply exactly once: server ids are tracked in a seen-set,
//! and a locally optimistic entry without a server id is matched by
//! sender + kind + content + timestamp proximity and collapsed when its
//! echo arrives.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use chorus_shared::constants::OPTIMISTIC_ECHO_WINDOW_MS;
use chorus_shared::types::{
    Conversation, ConversationFlags, ConversationId, Message, MessageId, Presence, UserId,
};

/// What applying an inbound message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedMessage {
    /// First sighting; inserted in order.
    Inserted,
    /// Already known (redelivery after a reconnect); ignored.
    Duplicate,
    /// Collapsed into a locally optimistic entry, which now carries the
    /// server id.
    Reconciled { local_id: MessageId },
}

#[derive(Default)]
struct History {
    /// Ascending `created_at`.
    messages: Vec<Message>,
    /// True until a page comes back shorter than requested.
    has_more: bool,
    /// Every message id ever applied for this conversation.
    seen: HashSet<MessageId>,
    /// Local ids of optimistic entries still waiting for their echo.
    optimistic: HashSet<MessageId>,
}

#[derive(Default)]
struct CacheInner {
    conversations: HashMap<ConversationId, Conversation>,
    histories: HashMap<ConversationId, History>,
    presence: HashMap<UserId, Presence>,
    typing: HashMap<ConversationId, HashSet<UserId>>,
}

#[derive(Default)]
pub struct ChatCache {
    inner: Mutex<CacheInner>,
}

impl ChatCache {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------

    pub fn upsert_conversation(&self, conversation: Conversation) {
        let mut inner = self.lock();
        inner.conversations.insert(conversation.id, conversation);
    }

    pub fn upsert_conversations(&self, conversations: Vec<Conversation>) {
        let mut inner = self.lock();
        for c in conversations {
            inner.conversations.insert(c.id, c);
        }
    }

    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.lock().conversations.get(&id).cloned()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.lock().conversations.values().cloned().collect()
    }

    /// Mutate a conversation's relationship flags, returning the previous
    /// value so a failed server call can roll back.
    pub fn set_flags(
        &self,
        id: ConversationId,
        update: impl FnOnce(&mut ConversationFlags),
    ) -> Option<ConversationFlags> {
        let mut inner = self.lock();
        let conversation = inner.conversations.get_mut(&id)?;
        let previous = conversation.flags;
        update(&mut conversation.flags);
        Some(previous)
    }

    // -----------------------------------------------------------------
    // Message pages
    // -----------------------------------------------------------------

    /// Install the latest page, replacing the cached tail.
    pub fn store_latest_page(
        &self,
        conversation: ConversationId,
        page: Vec<Message>,
        page_size: u32,
    ) {
        let mut inner = self.lock();
        let has_more = page.len() as u32 >= page_size;
        let history = inner.histories.entry(conversation).or_default();

        history.messages = page;
        history.messages.sort_by_key(|m| m.created_at);
        history.seen = history.messages.iter().map(|m| m.id).collect();
        history.optimistic.clear();
        history.has_more = has_more;
    }

    /// Prepend a page of strictly older messages.
    pub fn prepend_older_page(
        &self,
        conversation: ConversationId,
        page: Vec<Message>,
        page_size: u32,
    ) {
        let mut inner = self.lock();
        let has_more = page.len() as u32 >= page_size;
        let history = inner.histories.entry(conversation).or_default();

        let mut older: Vec<Message> = page
            .into_iter()
            .filter(|m| !history.seen.contains(&m.id))
            .collect();
        older.sort_by_key(|m| m.created_at);

        for m in &older {
            history.seen.insert(m.id);
        }
        older.append(&mut history.messages);
        history.messages = older;
        history.has_more = has_more;
    }

    /// Oldest cached message id, used as the `before` cursor when paging
    /// backward.
    pub fn oldest_message_id(&self, conversation: ConversationId) -> Option<MessageId> {
        self.lock()
            .histories
            .get(&conversation)
            .and_then(|h| h.messages.first().map(|m| m.id))
    }

    pub fn has_more(&self, conversation: ConversationId) -> bool {
        self.lock()
            .histories
            .get(&conversation)
            .map(|h| h.has_more)
            .unwrap_or(true)
    }

    pub fn messages(&self, conversation: ConversationId) -> Vec<Message> {
        self.lock()
            .histories
            .get(&conversation)
            .map(|h| h.messages.clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------
    // Live mutations
    // -----------------------------------------------------------------

    /// Insert a locally created message before server acknowledgment.
    pub fn insert_optimistic(&self, message: Message) {
        let mut inner = self.lock();
        let history = inner.histories.entry(message.conversation_id).or_default();
        history.seen.insert(message.id);
        history.optimistic.insert(message.id);
        insert_ordered(&mut history.messages, message);
    }

    /// Apply an inbound message exactly once.
    ///
    /// Redeliveries are dropped on the seen-set; an optimistic local entry
    /// is collapsed when the echo matches by sender + kind + content within
    /// the proximity window.
    pub fn apply_new_message(&self, message: Message) -> AppliedMessage {
        let mut inner = self.lock();

        // A new message from this sender supersedes their typing state.
        if let Some(typing) = inner.typing.get_mut(&message.conversation_id) {
            typing.remove(&message.sender);
        }

        let conversation_id = message.conversation_id;
        let history = inner.histories.entry(conversation_id).or_default();

        if history.seen.contains(&message.id) {
            return AppliedMessage::Duplicate;
        }

        let applied = match find_optimistic_match(history, &message) {
            Some(local_id) => {
                history.optimistic.remove(&local_id);
                history.seen.remove(&local_id);
                history.seen.insert(message.id);
                if let Some(pos) = history.messages.iter().position(|m| m.id == local_id) {
                    history.messages.remove(pos);
                }
                insert_ordered(&mut history.messages, message.clone());
                AppliedMessage::Reconciled { local_id }
            }
            None => {
                history.seen.insert(message.id);
                insert_ordered(&mut history.messages, message.clone());
                AppliedMessage::Inserted
            }
        };

        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.last_message_id = Some(message.id);
        }
        applied
    }

    /// Patch an edited message in place.
    pub fn apply_edit(
        &self,
        conversation: ConversationId,
        message: MessageId,
        content: String,
        edited_at: DateTime<Utc>,
    ) -> bool {
        let mut inner = self.lock();
        let Some(history) = inner.histories.get_mut(&conversation) else {
            return false;
        };
        match history.messages.iter_mut().find(|m| m.id == message) {
            Some(entry) => {
                entry.content = content;
                entry.edited_at = Some(edited_at);
                true
            }
            None => false,
        }
    }

    /// Mark a message deleted.  The entry stays so the UI can render a
    /// tombstone.
    pub fn apply_delete(&self, conversation: ConversationId, message: MessageId) -> bool {
        let mut inner = self.lock();
        let Some(history) = inner.histories.get_mut(&conversation) else {
            return false;
        };
        match history.messages.iter_mut().find(|m| m.id == message) {
            Some(entry) => {
                entry.deleted = true;
                true
            }
            None => false,
        }
    }

    pub fn apply_pin(
        &self,
        conversation: ConversationId,
        message: MessageId,
        pinned: bool,
    ) -> bool {
        let mut inner = self.lock();
        let Some(history) = inner.histories.get_mut(&conversation) else {
            return false;
        };
        match history.messages.iter_mut().find(|m| m.id == message) {
            Some(entry) => {
                entry.pinned = pinned;
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------
    // Presence / typing
    // -----------------------------------------------------------------

    pub fn update_presence(&self, presence: Presence) {
        let mut inner = self.lock();
        inner.presence.insert(presence.user_id, presence);
    }

    pub fn presence(&self, user: UserId) -> Option<Presence> {
        self.lock().presence.get(&user).cloned()
    }

    pub fn set_typing(&self, conversation: ConversationId, user: UserId, typing: bool) {
        let mut inner = self.lock();
        let set = inner.typing.entry(conversation).or_default();
        if typing {
            set.insert(user);
        } else {
            set.remove(&user);
        }
    }

    pub fn typing_users(&self, conversation: ConversationId) -> Vec<UserId> {
        self.lock()
            .typing
            .get(&conversation)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Insert keeping ascending `created_at`, stable for equal timestamps.
fn insert_ordered(messages: &mut Vec<Message>, message: Message) {
    let pos = messages
        .iter()
        .rposition(|m| m.created_at <= message.created_at)
        .map(|p| p + 1)
        .unwrap_or(0);
    messages.insert(pos, message);
}

/// Match a server message against pending optimistic entries: same sender,
/// same kind, same content, timestamps within the echo window.
fn find_optimistic_match(history: &History, incoming: &Message) -> Option<MessageId> {
    history
        .messages
        .iter()
        .filter(|m| history.optimistic.contains(&m.id))
        .find(|m| {
            m.sender == incoming.sender
                && m.kind == incoming.kind
                && m.content == incoming.content
                && (incoming.created_at - m.created_at)
                    .num_milliseconds()
                    .abs()
                    <= OPTIMISTIC_ECHO_WINDOW_MS
        })
        .map(|m| m.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chorus_shared::types::MessageKind;

    fn msg(conversation: ConversationId, sender: UserId, content: &str) -> Message {
        Message {
            id: MessageId::new(),
            conversation_id: conversation,
            sender,
            kind: MessageKind::Text,
            content: content.to_string(),
            reply_to: None,
            created_at: Utc::now(),
            edited_at: None,
            deleted: false,
            pinned: false,
        }
    }

    #[test]
    fn duplicate_delivery_applies_once() {
        let cache = ChatCache::new();
        let conv = ConversationId::new();
        let m = msg(conv, UserId::new(), "hello");

        assert_eq!(cache.apply_new_message(m.clone()), AppliedMessage::Inserted);
        assert_eq!(cache.apply_new_message(m), AppliedMessage::Duplicate);
        assert_eq!(cache.messages(conv).len(), 1);
    }

    #[test]
    fn optimistic_echo_collapses_to_one_entry() {
        let cache = ChatCache::new();
        let conv = ConversationId::new();
        let sender = UserId::new();

        let local = msg(conv, sender, "on my way");
        let local_id = local.id;
        cache.insert_optimistic(local.clone());

        // Server echo: real id, slightly later timestamp, same content.
        let mut echo = local;
        echo.id = MessageId::new();
        echo.created_at += Duration::milliseconds(800);

        assert_eq!(
            cache.apply_new_message(echo.clone()),
            AppliedMessage::Reconciled { local_id }
        );
        let messages = cache.messages(conv);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, echo.id);
    }

    #[test]
    fn echo_outside_window_is_a_new_entry() {
        let cache = ChatCache::new();
        let conv = ConversationId::new();
        let sender = UserId::new();

        let local = msg(conv, sender, "ping");
        cache.insert_optimistic(local.clone());

        let mut late = local;
        late.id = MessageId::new();
        late.created_at += Duration::milliseconds(OPTIMISTIC_ECHO_WINDOW_MS + 1);

        assert_eq!(cache.apply_new_message(late), AppliedMessage::Inserted);
        assert_eq!(cache.messages(conv).len(), 2);
    }

    #[test]
    fn messages_stay_in_ascending_order() {
        let cache = ChatCache::new();
        let conv = ConversationId::new();
        let sender = UserId::new();

        let mut first = msg(conv, sender, "a");
        let mut second = msg(conv, sender, "b");
        first.created_at = Utc::now() - Duration::minutes(2);
        second.created_at = Utc::now() - Duration::minutes(1);

        // Delivered out of order.
        cache.apply_new_message(second.clone());
        cache.apply_new_message(first.clone());

        let messages = cache.messages(conv);
        assert_eq!(messages[0].id, first.id);
        assert_eq!(messages[1].id, second.id);
    }

    #[test]
    fn older_page_prepends_and_tracks_has_more() {
        let cache = ChatCache::new();
        let conv = ConversationId::new();
        let sender = UserId::new();
        let base = Utc::now();

        let mut latest = Vec::new();
        for n in 0..3 {
            let mut m = msg(conv, sender, &format!("new-{n}"));
            m.created_at = base + Duration::seconds(n);
            latest.push(m);
        }
        cache.store_latest_page(conv, latest.clone(), 3);
        assert!(cache.has_more(conv));

        let mut older = Vec::new();
        for n in 0..2 {
            let mut m = msg(conv, sender, &format!("old-{n}"));
            m.created_at = base - Duration::minutes(10) + Duration::seconds(n);
            older.push(m);
        }
        cache.prepend_older_page(conv, older.clone(), 3);

        // Short page: nothing further back.
        assert!(!cache.has_more(conv));
        let messages = cache.messages(conv);
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].id, older[0].id);
        assert_eq!(messages[4].id, latest[2].id);
        assert_eq!(cache.oldest_message_id(conv), Some(older[0].id));
    }

    #[test]
    fn edit_delete_pin_flag_in_place() {
        let cache = ChatCache::new();
        let conv = ConversationId::new();
        let m = msg(conv, UserId::new(), "draft");
        let id = m.id;
        cache.apply_new_message(m);

        assert!(cache.apply_edit(conv, id, "final".into(), Utc::now()));
        assert!(cache.apply_pin(conv, id, true));
        assert!(cache.apply_delete(conv, id));

        let messages = cache.messages(conv);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "final");
        assert!(messages[0].edited_at.is_some());
        assert!(messages[0].pinned);
        assert!(messages[0].deleted);
    }

    #[test]
    fn flag_rollback_uses_previous_value() {
        let cache = ChatCache::new();
        let conv = Conversation {
            id: ConversationId::new(),
            name: None,
            participants: Vec::new(),
            last_message_id: None,
            flags: ConversationFlags::default(),
        };
        let id = conv.id;
        cache.upsert_conversation(conv);

        let previous = cache.set_flags(id, |f| f.muted = true).unwrap();
        assert!(!previous.muted);
        assert!(cache.conversation(id).unwrap().flags.muted);

        cache.set_flags(id, move |f| *f = previous);
        assert!(!cache.conversation(id).unwrap().flags.muted);
    }

    #[test]
    fn new_message_clears_sender_typing() {
        let cache = ChatCache::new();
        let conv = ConversationId::new();
        let sender = UserId::new();

        cache.set_typing(conv, sender, true);
        assert_eq!(cache.typing_users(conv), vec![sender]);

        cache.apply_new_message(msg(conv, sender, "sent"));
        assert!(cache.typing_users(conv).is_empty());
    }
}
