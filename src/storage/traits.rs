//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::CrawlStatus;
use crate::storage::{DomainRecord, ErrorRecord, RunRecord, VerificationRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Duplicate domain: {0}")]
    DuplicateDomain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write is a single statement committed on its own, so a process that
/// dies between two calls leaves the store with only complete records.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    fn create_run(&mut self, seed: &str, mode: &str, config_hash: &str) -> StorageResult<i64>;

    /// Sets the terminal status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: CrawlStatus) -> StorageResult<()>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Domains =====

    /// Appends a discovered domain
    ///
    /// Fails with [`StorageError::DuplicateDomain`] if the domain is already stored.
    fn insert_domain(&mut self, record: &DomainRecord) -> StorageResult<()>;

    /// Loads every stored domain in id order
    fn load_domains(&self) -> StorageResult<Vec<DomainRecord>>;

    fn count_domains(&self) -> StorageResult<u64>;

    // ===== Error Log =====

    /// Appends a terminal fetch failure
    fn append_error(&mut self, record: &ErrorRecord) -> StorageResult<()>;

    fn count_errors(&self) -> StorageResult<u64>;

    /// Loads the error log in insertion order
    fn load_errors(&self) -> StorageResult<Vec<ErrorRecord>>;

    // ===== Verification =====

    /// Stores the latest check for a domain, replacing any earlier one
    fn record_verification(&mut self, record: &VerificationRecord) -> StorageResult<()>;

    /// Loads all verification results ordered by domain
    fn load_verifications(&self) -> StorageResult<Vec<VerificationRecord>>;

    // ===== Statistics =====

    /// Domain counts grouped by server, largest first
    fn server_breakdown(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Error counts grouped by kind, largest first
    fn error_breakdown(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Maintenance =====

    /// Removes all domains, errors, runs and verification results
    fn clear_all(&mut self) -> StorageResult<()>;
}
