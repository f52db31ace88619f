//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `session` and `revoked_invites`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Session (single row; a restart preserves login)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS session (
    id            INTEGER PRIMARY KEY CHECK (id = 1),
    access_token  TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    updated_at    TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Revoked invites (local cache of server truth)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS revoked_invites (
    token               TEXT PRIMARY KEY NOT NULL,  -- encoded invite token
    group_id            TEXT NOT NULL,              -- UUID v4
    original_expires_at TEXT NOT NULL,              -- expiry at issue time, kept for audit
    revoked_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_revoked_invites_group
    ON revoked_invites(group_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
