//! The token store: the single piece of cross-component shared state.
//!
//! All components may read it; only the auth session manager writes.  A
//! write lands in the in-memory slot synchronously (so the HTTP client's
//! next request picks up the new token immediately) and is then broadcast
//! on a watch channel so the realtime supervisor can rebind or tear down.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;

use chorus_shared::types::Session;
use chorus_store::{Database, StoredSession};

pub struct TokenStore {
    current: Mutex<Option<Session>>,
    changes: watch::Sender<Option<Session>>,
    db: Option<Arc<Database>>,
}

impl TokenStore {
    /// Create a store, loading any persisted session so a restart
    /// preserves login.
    pub fn new(db: Option<Arc<Database>>) -> Self {
        let persisted = db.as_ref().and_then(|db| match db.load_session() {
            Ok(stored) => stored.map(|s| s.session()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load persisted session");
                None
            }
        });

        let (changes, _rx) = watch::channel(persisted.clone());
        Self {
            current: Mutex::new(persisted),
            changes,
            db,
        }
    }

    /// Snapshot of the current session.
    pub fn get(&self) -> Option<Session> {
        self.lock_current().clone()
    }

    /// The current access token, if a session exists.
    pub fn access_token(&self) -> Option<String> {
        self.lock_current().as_ref().map(|s| s.access_token.clone())
    }

    /// Install a new session.  The in-memory slot is updated before anyone
    /// is notified, so readers never observe the notification ahead of the
    /// token.
    pub fn set(&self, session: Session) {
        *self.lock_current() = Some(session.clone());
        self.persist(Some(&session));
        self.changes.send_replace(Some(session));
    }

    /// Drop the session and notify dependents so they tear themselves down.
    pub fn clear(&self) {
        *self.lock_current() = None;
        self.persist(None);
        self.changes.send_replace(None);
    }

    /// Subscribe to session changes (set and clear).
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.changes.subscribe()
    }

    fn persist(&self, session: Option<&Session>) {
        let Some(db) = &self.db else { return };
        let result = match session {
            Some(s) => db.save_session(&StoredSession {
                access_token: s.access_token.clone(),
                refresh_token: s.refresh_token.clone(),
                updated_at: Utc::now(),
            }),
            None => db.clear_session().map(|_| ()),
        };
        if let Err(e) = result {
            // Persistence is best-effort; the in-memory session stays valid.
            tracing::warn!(error = %e, "failed to persist session");
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Session>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(n: u32) -> Session {
        Session {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
        }
    }

    #[test]
    fn set_is_visible_before_notification() {
        let store = TokenStore::new(None);
        let rx = store.subscribe();

        store.set(session(1));
        // The watch channel saw the change...
        assert_eq!(
            rx.borrow().as_ref().map(|s| s.access_token.clone()),
            Some("access-1".to_string())
        );
        // ...and the in-memory slot agrees.
        assert_eq!(store.access_token(), Some("access-1".to_string()));
    }

    #[test]
    fn clear_notifies_subscribers() {
        let store = TokenStore::new(None);
        store.set(session(1));

        let mut rx = store.subscribe();
        store.clear();

        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
        assert!(store.get().is_none());
    }

    #[test]
    fn restart_preserves_login() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_at(&dir.path().join("t.db")).unwrap());

        {
            let store = TokenStore::new(Some(db.clone()));
            store.set(session(7));
        }

        let reopened = TokenStore::new(Some(db));
        assert_eq!(reopened.access_token(), Some("access-7".to_string()));
    }

    #[test]
    fn logout_clears_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_at(&dir.path().join("t.db")).unwrap());

        let store = TokenStore::new(Some(db.clone()));
        store.set(session(1));
        store.clear();

        assert!(TokenStore::new(Some(db)).get().is_none());
    }
}
