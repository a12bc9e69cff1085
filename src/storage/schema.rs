//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Domain-Reach database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    seed TEXT NOT NULL,
    mode TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Discovered domains; ids are assigned by the registry, never reused
CREATE TABLE IF NOT EXISTS domains (
    id INTEGER PRIMARY KEY,
    domain TEXT NOT NULL UNIQUE,
    server TEXT NOT NULL,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_domains_server ON domains(server);

-- Append-only log of URLs that exhausted their retry budget
CREATE TABLE IF NOT EXISTS errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    url TEXT NOT NULL,
    error_kind TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_errors_kind ON errors(error_kind);

-- Latest reachability check per registered domain
CREATE TABLE IF NOT EXISTS verifications (
    domain TEXT PRIMARY KEY,
    accessible INTEGER NOT NULL,
    status_code INTEGER,
    verified_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
