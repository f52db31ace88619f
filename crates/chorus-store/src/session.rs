use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::StoredSession;

impl Database {
    /// Persist the session, replacing any previous one.
    pub fn save_session(&self, session: &StoredSession) -> Result<()> {
        self.conn().execute(
            "INSERT INTO session (id, access_token, refresh_token, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 updated_at = excluded.updated_at",
            params![
                session.access_token,
                session.refresh_token,
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load the persisted session, if one exists.
    pub fn load_session(&self) -> Result<Option<StoredSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT access_token, refresh_token, updated_at FROM session WHERE id = 1",
        )?;
        let mut rows = stmt.query_map([], row_to_session)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Remove the persisted session (logout).
    pub fn clear_session(&self) -> Result<bool> {
        let affected = self.conn().execute("DELETE FROM session WHERE id = 1", [])?;
        Ok(affected > 0)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredSession> {
    let access_token: String = row.get(0)?;
    let refresh_token: String = row.get(1)?;
    let updated_str: String = row.get(2)?;

    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StoredSession {
        access_token,
        refresh_token,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn session_round_trip() {
        let (_dir, db) = open_test_db();

        assert!(db.load_session().unwrap().is_none());

        let session = StoredSession {
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            updated_at: Utc::now(),
        };
        db.save_session(&session).unwrap();

        let loaded = db.load_session().unwrap().expect("session stored");
        assert_eq!(loaded.access_token, "access-1");
        assert_eq!(loaded.refresh_token, "refresh-1");
    }

    #[test]
    fn save_replaces_previous_session() {
        let (_dir, db) = open_test_db();

        for n in 1..=2 {
            db.save_session(&StoredSession {
                access_token: format!("access-{n}"),
                refresh_token: format!("refresh-{n}"),
                updated_at: Utc::now(),
            })
            .unwrap();
        }

        let loaded = db.load_session().unwrap().expect("session stored");
        assert_eq!(loaded.access_token, "access-2");
    }

    #[test]
    fn clear_session_removes_row() {
        let (_dir, db) = open_test_db();

        db.save_session(&StoredSession {
            access_token: "a".into(),
            refresh_token: "r".into(),
            updated_at: Utc::now(),
        })
        .unwrap();

        assert!(db.clear_session().unwrap());
        assert!(db.load_session().unwrap().is_none());
        // Clearing twice is a no-op, not an error.
        assert!(!db.clear_session().unwrap());
    }
}
