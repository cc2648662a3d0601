//! Commit Store - SQLite persistence for collected commits
//!
//! One table keyed by commit hash. Writes are idempotent (first write wins)
//! and batched in a single transaction; the per-day rollup is computed on
//! demand from the stored author timestamps.

use chrono::{NaiveDate, SecondsFormat};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Commit, DayCount};

const CREATE_SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS commits (
        hash      TEXT PRIMARY KEY,
        date      TEXT NOT NULL,
        repo_name TEXT NOT NULL
    );
"#;

/// Commit database
pub struct CommitStore {
    conn: Mutex<Connection>,
}

impl CommitStore {
    /// Open or create the commit database at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Store(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;

        info!("Commit database opened at {}", path.display());
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("database connection lock poisoned".to_string()))
    }

    /// Create the commit table if absent. Safe to call on every sync.
    pub fn ensure_schema(&self) -> Result<()> {
        self.connection()?.execute_batch(CREATE_SCHEMA_SQL)?;
        debug!("Commit schema ensured");
        Ok(())
    }

    /// Write a batch of commits in one transaction.
    ///
    /// Hashes already present are skipped, never overwritten. Returns the
    /// number of rows newly written. On any failure nothing from the batch
    /// is committed.
    pub fn persist(&self, commits: &[Commit]) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO commits (hash, date, repo_name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(hash) DO NOTHING",
            )?;

            for commit in commits {
                inserted += stmt.execute(params![
                    commit.hash,
                    commit
                        .author_date
                        .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    commit.repo_full_name,
                ])?;
            }
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit()?;

        info!(
            "Persisted {} new commits ({} already stored)",
            inserted,
            commits.len() - inserted
        );
        Ok(inserted)
    }

    /// Per-day commit counts for days strictly after `since`.
    ///
    /// Days are UTC calendar days. Row order is unspecified.
    pub fn rollup(&self, since: NaiveDate) -> Result<Vec<DayCount>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT date(date) AS day, COUNT(DISTINCT hash) AS commit_count
            FROM commits
            WHERE date(date) > ?1
            GROUP BY day
            "#,
        )?;

        let rows = stmt
            .query_map(params![since.format("%Y-%m-%d").to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(day, count)| {
                NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map(|date| DayCount::new(date, count))
                    .map_err(|e| Error::Store(format!("invalid stored day {:?}: {}", day, e)))
            })
            .collect()
    }

    /// Total number of stored commits
    pub fn commit_count(&self) -> Result<u64> {
        let count: i64 = self
            .connection()?
            .query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Repository recorded for a commit, if the hash is stored
    pub fn repo_for(&self, hash: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT repo_name FROM commits WHERE hash = ?1")?;
        let mut rows = stmt.query(params![hash])?;

        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}
