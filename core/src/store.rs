//! SQLite persistence for cached analyses.
//!
//! RULE: Only store.rs talks to the database.
//! Everything else goes through the CacheBackend seam — the engine
//! neither knows nor cares whether entries live in memory or on disk.
//!
//! Entries are stored whole as JSON: one row per dataset, replaced on
//! every save. The schema stays trivial and the report shape can evolve
//! without migrations.

use crate::cache::{CacheBackend, CacheEntry};
use crate::error::{AuditError, AuditResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

pub struct ReportStore {
    conn: Mutex<Connection>,
}

impl ReportStore {
    /// Open (or create) the report database at `path`.
    pub fn open(path: &str) -> AuditResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AuditResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AuditResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(include_str!("../../migrations/001_reports.sql"))?;
        Ok(())
    }

    fn lock(&self) -> AuditResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| AuditError::LockPoisoned {
            context: "report store connection".to_string(),
        })
    }

    pub fn entry_count(&self) -> AuditResult<usize> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM analysis_entry", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl CacheBackend for ReportStore {
    fn load(&self, key: &str) -> AuditResult<Option<CacheEntry>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT entry_json FROM analysis_entry WHERE dataset_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, entry: &CacheEntry) -> AuditResult<()> {
        let json = serde_json::to_string(entry)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO analysis_entry (dataset_key, entry_json, computed_at)
             VALUES (?1, ?2, ?3)",
            params![key, json, entry.computed_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AuditResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM analysis_entry WHERE dataset_key = ?1",
            params![key],
        )?;
        Ok(())
    }
}
