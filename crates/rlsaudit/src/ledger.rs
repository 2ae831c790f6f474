//! Durable per-release processing state.
//!
//! One row per (release, containing path). The `approved` and `processed`
//! columns are also written by operators and external tooling: setting
//! `approved = 1` forces a release to complete on the next visit, clearing
//! `processed` makes it eligible for evaluation again. Nothing here ever
//! deletes a row.
//!
//! The table layout matches ledgers written by the earlier incompletes
//! checker so an existing database can be pointed at directly.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS Releases(
    id INTEGER PRIMARY KEY,
    timestamp INTEGER,
    release TEXT,
    path TEXT,
    incomplete INTEGER,
    approved INTEGER,
    processed INTEGER
);
CREATE INDEX IF NOT EXISTS `rlspath` ON `Releases` (`release`, `path`);
"#;

/// A row of the `Releases` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub id: i64,
    pub timestamp: i64,
    pub release: String,
    pub path: String,
    pub incomplete: bool,
    pub approved: bool,
    pub processed: bool,
}

impl LedgerRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            timestamp: row.get::<_, Option<i64>>("timestamp")?.unwrap_or_default(),
            release: row.get("release")?,
            path: row.get("path")?,
            incomplete: row.get::<_, Option<i64>>("incomplete")?.unwrap_or_default() != 0,
            approved: row.get::<_, Option<i64>>("approved")?.unwrap_or_default() != 0,
            processed: row.get::<_, Option<i64>>("processed")?.unwrap_or_default() != 0,
        })
    }
}

/// SQLite-backed ledger. Single writer; no locking beyond SQLite's own.
#[derive(Debug)]
pub struct Ledger {
    conn: Connection,
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Ledger {
    /// Open or create the ledger at `path`, creating the schema if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let ledger = Self::with_connection(conn)?;
        info!(path = %path.display(), "Ledger opened");
        Ok(ledger)
    }

    /// In-memory ledger, for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    pub fn lookup(&self, release: &str, path: &str) -> Result<Option<LedgerRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, timestamp, release, path, incomplete, approved, processed \
                 FROM Releases WHERE release = ?1 AND path = ?2 ORDER BY id LIMIT 1",
                params![release, path],
                LedgerRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn insert(
        &self,
        release: &str,
        path: &str,
        incomplete: bool,
        approved: bool,
        processed: bool,
    ) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO Releases (timestamp, release, path, incomplete, approved, processed) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                now_secs(),
                release,
                path,
                i64::from(incomplete),
                i64::from(approved),
                i64::from(processed)
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        debug!(release, path, id, incomplete, processed, "ledger insert");
        Ok(id)
    }

    pub fn update_processed(&self, id: i64, processed: bool) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE Releases SET timestamp = ?1, processed = ?2 WHERE id = ?3",
            params![now_secs(), i64::from(processed), id],
        )?;
        tx.commit()?;
        debug!(id, processed, "ledger processed update");
        Ok(())
    }

    pub fn update_incomplete(&self, id: i64, incomplete: bool) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE Releases SET timestamp = ?1, incomplete = ?2 WHERE id = ?3",
            params![now_secs(), i64::from(incomplete), id],
        )?;
        tx.commit()?;
        debug!(id, incomplete, "ledger incomplete update");
        Ok(())
    }

    /// Mark a record complete and processed in one write.
    pub fn mark_complete(&self, id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE Releases SET timestamp = ?1, incomplete = 0, processed = 1 WHERE id = ?2",
            params![now_secs(), id],
        )?;
        tx.commit()?;
        debug!(id, "ledger marked complete");
        Ok(())
    }

    /// Set `approved` on a record.
    ///
    /// The audit never approves anything itself; this is the entry point
    /// for operator tooling (and tests) that force a release to complete.
    pub fn set_approved(&self, id: i64, approved: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE Releases SET approved = ?1 WHERE id = ?2",
            params![i64::from(approved), id],
        )?;
        Ok(())
    }

    /// Number of rows in the ledger.
    pub fn count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM Releases", [], |row| row.get(0))?)
    }
}
