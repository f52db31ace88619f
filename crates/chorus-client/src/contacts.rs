//! Contact list, debounced search, relationship flags.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chorus_shared::types::{Conversation, ConversationFlags, ConversationId, User};

use crate::api::contacts::RelationshipFlag;
use crate::api::ApiClient;
use crate::cache::ChatCache;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::events::{ClientEvent, EventHub};

pub struct ContactService {
    api: Arc<ApiClient>,
    cache: Arc<ChatCache>,
    events: EventHub,
    debouncer: Debouncer,
    contacts: Mutex<Vec<User>>,
}

impl ContactService {
    pub fn new(
        api: Arc<ApiClient>,
        cache: Arc<ChatCache>,
        events: EventHub,
        debounce_interval: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            events,
            debouncer: Debouncer::new(debounce_interval),
            contacts: Mutex::new(Vec::new()),
        }
    }

    /// Fetch the contact list and refresh the local mirror.
    pub async fn refresh(&self) -> Result<Vec<User>> {
        let contacts = self.api.fetch_contacts().await?;
        *self.lock_contacts() = contacts.clone();
        Ok(contacts)
    }

    /// Last fetched contact list.
    pub fn contacts(&self) -> Vec<User> {
        self.lock_contacts().clone()
    }

    /// Immediate search.
    pub async fn search(&self, query: &str) -> Result<Vec<User>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.api.search_users(query).await
    }

    /// Debounced search: only the last query inside the window hits the
    /// network; results arrive as a [`ClientEvent::SearchResults`].
    pub fn search_debounced(&self, query: String) {
        if query.trim().is_empty() {
            self.debouncer.cancel();
            return;
        }
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        self.debouncer.schedule(async move {
            match api.search_users(&query).await {
                Ok(users) => events.emit(ClientEvent::SearchResults { query, users }),
                Err(e) => tracing::warn!(error = %e, query, "contact search failed"),
            }
        });
    }

    /// Cancel pending debounced work (view teardown).
    pub fn cancel_pending(&self) {
        self.debouncer.cancel();
    }

    /// Toggle a relationship flag, optimistically in the cache, rolling
    /// back if the server rejects it.
    pub async fn set_flag(
        &self,
        conversation: ConversationId,
        flag: RelationshipFlag,
        value: bool,
    ) -> Result<Conversation> {
        let previous = self
            .cache
            .set_flags(conversation, |flags| apply_flag(flags, flag, value));

        match self.api.set_relationship_flag(conversation, flag, value).await {
            Ok(updated) => {
                self.cache.upsert_conversation(updated.clone());
                Ok(updated)
            }
            Err(e) => {
                if let Some(previous) = previous {
                    self.cache.set_flags(conversation, move |flags| *flags = previous);
                }
                Err(e)
            }
        }
    }

    fn lock_contacts(&self) -> MutexGuard<'_, Vec<User>> {
        self.contacts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn apply_flag(flags: &mut ConversationFlags, flag: RelationshipFlag, value: bool) {
    match flag {
        RelationshipFlag::Archived => flags.archived = value,
        RelationshipFlag::Muted => flags.muted = value,
        RelationshipFlag::Pinned => flags.pinned = value,
        RelationshipFlag::Favorited => flags.favorited = value,
        RelationshipFlag::Blocked => flags.blocked = value,
    }
}
