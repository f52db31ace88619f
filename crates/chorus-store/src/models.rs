//! Model structs persisted in the local database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chorus_shared::types::{ConversationId, Session};

// ---------------------------------------------------------------------------
// Stored session
// ---------------------------------------------------------------------------

/// The persisted login session.  At most one row exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    /// When the tokens were last written (login or refresh).
    pub updated_at: DateTime<Utc>,
}

impl StoredSession {
    /// The in-memory form handed to the token store.
    pub fn session(&self) -> Session {
        Session {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Revoked invite
// ---------------------------------------------------------------------------

/// A revoked invite token.
///
/// `original_expires_at` keeps the expiry the token carried when issued,
/// for audit, distinct from the now-forced-past validity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevokedInvite {
    /// The encoded token string (primary key).
    pub token: String,
    /// The group the invite targeted.
    pub group_id: ConversationId,
    pub original_expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}
