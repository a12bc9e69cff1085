//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - The append-only domain table that resume is built on
//! - The terminal error log
//! - Run tracking
//! - Domain verification results

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::CrawlStatus;
use std::path::{Path, PathBuf};

/// File name of the database inside the data directory
pub const DATABASE_FILE: &str = "domains.db";

/// Path of the database for a given data directory
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

/// Opens (creating if needed) the database inside `data_dir`
pub fn open_storage(data_dir: &Path) -> StorageResult<SqliteStorage> {
    std::fs::create_dir_all(data_dir)?;
    SqliteStorage::new(&database_path(data_dir))
}

/// Represents a discovered domain in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    pub id: u64,
    pub domain: String,
    pub server: String,
    pub discovered_at: String,
}

/// Represents one URL that exhausted its retry budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub timestamp: String,
    pub url: String,
    pub error_kind: String,
    pub message: String,
}

/// Outcome of checking whether a registered domain still answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
    pub domain: String,
    /// True for any final status below 400
    pub accessible: bool,
    /// Final status code; `None` when no response arrived
    pub status_code: Option<u16>,
    pub verified_at: String,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub seed: String,
    pub mode: String,
    pub config_hash: String,
    pub status: CrawlStatus,
}
