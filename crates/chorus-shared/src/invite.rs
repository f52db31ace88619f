//! Self-contained group invite tokens.
//!
//! An invite is a base64url-wrapped JSON record carrying everything needed
//! to check it: target group, issue time and expiry. Decoding and expiry
//! checks work offline with no server round-trip. Revocation is tracked
//! separately (see the client's invite registry); the codec itself is
//! stateless.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ConversationId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InviteClaims {
    pub group_id: ConversationId,
    pub expires_at: DateTime<Utc>,
    pub expiration_days: u32,
    pub issued_at_ms: i64,
}

impl InviteClaims {
    /// Issue a new invite valid for `expiration_days` from `now`.
    pub fn issue_at(now: DateTime<Utc>, group_id: ConversationId, expiration_days: u32) -> Self {
        Self {
            group_id,
            expires_at: now + Duration::days(i64::from(expiration_days)),
            expiration_days,
            issued_at_ms: now.timestamp_millis(),
        }
    }

    /// Issue a new invite valid for `expiration_days` from the current time.
    pub fn issue(group_id: ConversationId, expiration_days: u32) -> Self {
        Self::issue_at(Utc::now(), group_id, expiration_days)
    }

    /// An invite whose expiry equals the current instant is already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Encode the claims as a URL-safe, copiable token string.
    pub fn encode(&self) -> String {
        // Serializing an owned, derive-built struct cannot fail.
        let json = serde_json::to_vec(self).expect("invite serialization");
        base64_url_encode(&json)
    }

    /// Decode a token string back into claims.
    ///
    /// Returns `None` on any malformed input; this never panics and never
    /// surfaces an error to the caller.
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = base64_url_decode(token)?;
        serde_json::from_slice(&bytes).ok()
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.decode(s.trim()).ok()
}
