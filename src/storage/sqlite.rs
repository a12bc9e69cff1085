//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::CrawlStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{DomainRecord, ErrorRecord, RunRecord, VerificationRecord};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// How long a connection waits on a lock held by another connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// Several `SqliteStorage` values may be opened on the same file; WAL mode
    /// and the busy timeout let them write without `SQLITE_BUSY` failures.
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn grouped_counts(&self, sql: &str) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, seed: &str, mode: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, seed, mode, config_hash, status) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![now, seed, mode, config_hash, CrawlStatus::Crawling.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, status: CrawlStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, seed, mode, config_hash, status
             FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    seed: row.get(3)?,
                    mode: row.get(4)?,
                    config_hash: row.get(5)?,
                    // A run row left in "crawling" belongs to a process that died
                    status: CrawlStatus::from_db_string(&row.get::<_, String>(6)?)
                        .unwrap_or(CrawlStatus::Interrupted),
                })
            })
            .optional()?;

        Ok(run)
    }

    // ===== Domains =====

    fn insert_domain(&mut self, record: &DomainRecord) -> StorageResult<()> {
        self.conn
            .execute(
                "INSERT INTO domains (id, domain, server, discovered_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id as i64,
                    record.domain,
                    record.server,
                    record.discovered_at
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StorageError::DuplicateDomain(record.domain.clone())
                } else {
                    StorageError::Sqlite(e)
                }
            })?;
        Ok(())
    }

    fn load_domains(&self) -> StorageResult<Vec<DomainRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, domain, server, discovered_at FROM domains ORDER BY id")?;

        let domains = stmt
            .query_map([], |row| {
                Ok(DomainRecord {
                    id: row.get::<_, i64>(0)? as u64,
                    domain: row.get(1)?,
                    server: row.get(2)?,
                    discovered_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(domains)
    }

    fn count_domains(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM domains", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Error Log =====

    fn append_error(&mut self, record: &ErrorRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO errors (timestamp, url, error_kind, message) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.timestamp,
                record.url,
                record.error_kind,
                record.message
            ],
        )?;
        Ok(())
    }

    fn count_errors(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM errors", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn load_errors(&self) -> StorageResult<Vec<ErrorRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT timestamp, url, error_kind, message FROM errors ORDER BY id")?;

        let errors = stmt
            .query_map([], |row| {
                Ok(ErrorRecord {
                    timestamp: row.get(0)?,
                    url: row.get(1)?,
                    error_kind: row.get(2)?,
                    message: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(errors)
    }

    // ===== Verification =====

    fn record_verification(&mut self, record: &VerificationRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO verifications (domain, accessible, status_code, verified_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.domain,
                record.accessible,
                record.status_code,
                record.verified_at
            ],
        )?;
        Ok(())
    }

    fn load_verifications(&self) -> StorageResult<Vec<VerificationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, accessible, status_code, verified_at FROM verifications ORDER BY domain",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(VerificationRecord {
                    domain: row.get(0)?,
                    accessible: row.get(1)?,
                    status_code: row.get(2)?,
                    verified_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Statistics =====

    fn server_breakdown(&self) -> StorageResult<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT CASE WHEN server = '' THEN 'unknown' ELSE server END AS s, COUNT(*) AS c
             FROM domains GROUP BY s ORDER BY c DESC, s ASC",
        )
    }

    fn error_breakdown(&self) -> StorageResult<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT error_kind, COUNT(*) AS c FROM errors GROUP BY error_kind ORDER BY c DESC, error_kind ASC",
        )
    }

    // ===== Maintenance =====

    fn clear_all(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            BEGIN;
            DELETE FROM domains;
            DELETE FROM errors;
            DELETE FROM runs;
            DELETE FROM verifications;
            COMMIT;
        ",
        )?;
        Ok(())
    }
}
