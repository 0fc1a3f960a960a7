use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Thread-safe SQLite handle (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    // ── Credential ────────────────────────────────────────────────────────────

    /// Insert the credential row, or overwrite it if it already exists.
    /// Returns the row id.
    pub fn upsert_credential(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at_ms: i64,
    ) -> Result<String> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO credentials (id, access_token, refresh_token, expires_at_ms, updated_at)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(id) DO UPDATE SET
                access_token=excluded.access_token,
                refresh_token=excluded.refresh_token,
                expires_at_ms=excluded.expires_at_ms,
                updated_at=excluded.updated_at",
            params![
                CREDENTIAL_KEY,
                access_token,
                refresh_token,
                expires_at_ms,
                Utc::now(),
            ],
        )?;
        Ok(CREDENTIAL_KEY.to_string())
    }

    /// Fetch the credential row, if one has ever been written
    pub fn fetch_credential(&self) -> Result<Option<CredentialRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at_ms, updated_at
                 FROM credentials WHERE id=?1",
                params![CREDENTIAL_KEY],
                map_credential,
            )
            .optional()?;
        Ok(record)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_credential(row: &rusqlite::Row) -> rusqlite::Result<CredentialRecord> {
    Ok(CredentialRecord {
        access_token: row.get(0)?,
        refresh_token: row.get(1)?,
        expires_at_ms: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id            TEXT    PRIMARY KEY,
    access_token  TEXT    NOT NULL,
    refresh_token TEXT,
    expires_at_ms INTEGER NOT NULL,
    updated_at    TEXT    NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.fetch_credential().unwrap().is_none());
    }

    #[test]
    fn test_upsert_then_fetch_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .upsert_credential("access-1", Some("refresh-1"), 1_700_000_000_000)
            .unwrap();
        assert_eq!(id, CREDENTIAL_KEY);

        let rec = db.fetch_credential().unwrap().unwrap();
        assert_eq!(rec.access_token, "access-1");
        assert_eq!(rec.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(rec.expires_at_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_upsert_overwrites_single_row() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_credential("access-1", Some("refresh-1"), 1).unwrap();
        db.upsert_credential("access-2", None, 2).unwrap();

        let rec = db.fetch_credential().unwrap().unwrap();
        assert_eq!(rec.access_token, "access-2");
        assert_eq!(rec.refresh_token, None);
        assert_eq!(rec.expires_at_ms, 2);

        let count: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM credentials", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
