use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use chorus_shared::types::ConversationId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::RevokedInvite;

impl Database {
    /// Record a revocation.  Revoking an already-revoked token keeps the
    /// original revocation timestamp.
    pub fn record_revocation(&self, invite: &RevokedInvite) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO revoked_invites
                 (token, group_id, original_expires_at, revoked_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                invite.token,
                invite.group_id.to_string(),
                invite.original_expires_at.to_rfc3339(),
                invite.revoked_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up the revocation entry for a token, if any.
    pub fn find_revocation(&self, token: &str) -> Result<Option<RevokedInvite>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT token, group_id, original_expires_at, revoked_at
             FROM revoked_invites WHERE token = ?1",
        )?;
        let mut rows = stmt.query_map(params![token], row_to_revoked_invite)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List every revocation, most recent first.
    pub fn list_revocations(&self) -> Result<Vec<RevokedInvite>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT token, group_id, original_expires_at, revoked_at
             FROM revoked_invites ORDER BY revoked_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_revoked_invite)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_revoked_invite(row: &rusqlite::Row<'_>) -> rusqlite::Result<RevokedInvite> {
    let token: String = row.get(0)?;
    let group_str: String = row.get(1)?;
    let expires_str: String = row.get(2)?;
    let revoked_str: String = row.get(3)?;

    let group_id = Uuid::parse_str(&group_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let original_expires_at = parse_ts(&expires_str, 2)?;
    let revoked_at = parse_ts(&revoked_str, 3)?;

    Ok(RevokedInvite {
        token,
        group_id: ConversationId(group_id),
        original_expires_at,
        revoked_at,
    })
}

fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}
