//! Lazily populated user directory.
//!
//! Profiles are fetched on first use and cached for the lifetime of the
//! session, keyed by id and by email.  Entries are invalidated explicitly
//! on profile update; the cache is best-effort and may be stale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chorus_shared::types::{User, UserId};

use crate::api::users::ProfileUpdate;
use crate::api::ApiClient;
use crate::error::Result;

#[derive(Default)]
struct DirectoryInner {
    by_id: HashMap<UserId, User>,
    by_email: HashMap<String, UserId>,
    me: Option<UserId>,
}

pub struct UserDirectory {
    api: Arc<ApiClient>,
    inner: Mutex<DirectoryInner>,
}

impl UserDirectory {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            inner: Mutex::new(DirectoryInner::default()),
        }
    }

    /// The logged-in user's own profile.
    pub async fn me(&self) -> Result<User> {
        if let Some(user) = {
            let inner = self.lock();
            inner.me.and_then(|id| inner.by_id.get(&id).cloned())
        } {
            return Ok(user);
        }
        let user = self.api.fetch_me().await?;
        self.store(&user, true);
        Ok(user)
    }

    pub async fn get(&self, id: UserId) -> Result<User> {
        if let Some(user) = self.cached(id) {
            return Ok(user);
        }
        let user = self.api.fetch_user(id).await?;
        self.store(&user, false);
        Ok(user)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User> {
        let key = email.trim().to_ascii_lowercase();
        if let Some(user) = {
            let inner = self.lock();
            inner
                .by_email
                .get(&key)
                .and_then(|id| inner.by_id.get(id).cloned())
        } {
            return Ok(user);
        }
        let user = self.api.fetch_user_by_email(&key).await?;
        self.store(&user, false);
        Ok(user)
    }

    pub fn cached(&self, id: UserId) -> Option<User> {
        self.lock().by_id.get(&id).cloned()
    }

    /// Drop a cached profile so the next read refetches it.
    pub fn invalidate(&self, id: UserId) {
        let mut inner = self.lock();
        if let Some(user) = inner.by_id.remove(&id) {
            inner.by_email.remove(&user.email.to_ascii_lowercase());
        }
    }

    /// Update the caller's profile, invalidating the stale entry and
    /// caching the server's version.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        let user = self.api.update_profile(update).await?;
        self.invalidate(user.id);
        self.store(&user, true);
        Ok(user)
    }

    fn store(&self, user: &User, is_me: bool) {
        let mut inner = self.lock();
        inner
            .by_email
            .insert(user.email.to_ascii_lowercase(), user.id);
        inner.by_id.insert(user.id, user.clone());
        if is_me {
            inner.me = Some(user.id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
