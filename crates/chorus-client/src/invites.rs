//! Invite registry: the stateless codec plus the local revocation table.
//!
//! Validity is checked offline: a token is valid iff it decodes, is not in
//! the revocation table, and has not expired.  Revocation wins over expiry
//! so a revoked-but-unexpired token reports the real reason.  The local
//! table is a cache of server truth, not the source of it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use chorus_shared::invite::InviteClaims;
use chorus_shared::types::ConversationId;
use chorus_store::{Database, RevokedInvite};

use crate::error::{ClientError, Result};

/// Outcome of validating an invite token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteValidation {
    Valid(InviteClaims),
    /// Undecodable input.
    Invalid,
    /// Present in the revocation table.
    Revoked,
    /// Past its expiry (an expiry of exactly "now" counts).
    Expired,
}

impl InviteValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, InviteValidation::Valid(_))
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            InviteValidation::Valid(_) => None,
            InviteValidation::Invalid => Some("invalid"),
            InviteValidation::Revoked => Some("revoked"),
            InviteValidation::Expired => Some("expired"),
        }
    }
}

pub struct InviteRegistry {
    db: Arc<Database>,
}

impl InviteRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Issue an invite for a group, valid for `expiration_days`.
    pub fn create(&self, group: ConversationId, expiration_days: u32) -> String {
        let token = InviteClaims::issue(group, expiration_days).encode();
        tracing::info!(group = %group, expiration_days, "invite created");
        token
    }

    pub fn validate(&self, token: &str) -> Result<InviteValidation> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<InviteValidation> {
        let Some(claims) = InviteClaims::decode(token) else {
            return Ok(InviteValidation::Invalid);
        };
        if self.db.find_revocation(token)?.is_some() {
            return Ok(InviteValidation::Revoked);
        }
        if claims.is_expired_at(now) {
            return Ok(InviteValidation::Expired);
        }
        Ok(InviteValidation::Valid(claims))
    }

    /// Revoke a token.  The entry keeps the token's original expiry for
    /// audit; re-revoking keeps the first revocation timestamp.
    pub fn revoke(&self, token: &str) -> Result<RevokedInvite> {
        let claims = InviteClaims::decode(token)
            .ok_or_else(|| ClientError::Validation("malformed invite token".into()))?;

        let record = RevokedInvite {
            token: token.to_string(),
            group_id: claims.group_id,
            original_expires_at: claims.expires_at,
            revoked_at: Utc::now(),
        };
        self.db.record_revocation(&record)?;
        tracing::info!(group = %claims.group_id, "invite revoked");

        match self.db.find_revocation(token)? {
            Some(stored) => Ok(stored),
            None => Ok(record),
        }
    }

    pub fn revocations(&self) -> Result<Vec<RevokedInvite>> {
        Ok(self.db.list_revocations()?)
    }
}
