//! Progress snapshot reporter
//!
//! Snapshots are written to a temporary file next to the target and renamed
//! over it, so a reader never observes a half-written file.

use crate::state::{CrawlStats, CrawlStatus};
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the snapshot inside the data directory
pub const SNAPSHOT_FILE: &str = "progress.json";

/// Entries kept in the top-servers and top-domains lists
const TOP_N: usize = 10;

/// Point-in-time view of a crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: CrawlStatus,
    pub urls_crawled: u64,
    pub unique_domains: u64,
    pub unique_hosts: u64,
    pub errors: u64,
    pub parse_errors: u64,
    pub memory_bytes: u64,
    pub elapsed_secs: f64,
    /// URLs per second over the whole run
    pub crawl_rate: f64,
    /// Failed fraction of attempts over the last 30 seconds
    pub recent_error_rate: f64,
    pub frontier_len: u64,
    pub top_servers: Vec<(String, u64)>,
    pub top_domains: Vec<(String, u64)>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    pub fn capture(
        stats: &CrawlStats,
        memory_bytes: u64,
        unique_hosts: usize,
        frontier_len: usize,
    ) -> Self {
        Self {
            status: stats.status,
            urls_crawled: stats.urls_crawled,
            unique_domains: stats.unique_domains,
            unique_hosts: unique_hosts as u64,
            errors: stats.error_count,
            parse_errors: stats.parse_errors,
            memory_bytes,
            elapsed_secs: stats.elapsed().as_secs_f64(),
            crawl_rate: stats.crawl_rate(),
            recent_error_rate: stats.recent_error_rate(),
            frontier_len: frontier_len as u64,
            top_servers: stats.top_servers(TOP_N),
            top_domains: stats.top_domains(TOP_N),
            started_at: stats.started_at,
            finished_at: stats.finished_at,
        }
    }
}

/// Writes snapshots to `<data-dir>/progress.json`
pub struct Reporter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Reporter {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SNAPSHOT_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the snapshot file atomically
    ///
    /// The temporary file is synced before the rename so a crash never leaves
    /// a renamed but empty snapshot behind.
    pub fn report(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let _guard = self.write_lock.lock();
        let mut file = File::create(&tmp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            "Snapshot written: {} URLs, {} domains",
            snapshot.urls_crawled,
            snapshot.unique_domains
        );
        Ok(())
    }
}

/// Reads a snapshot written by [`Reporter::report`]
pub fn load_snapshot(path: &Path) -> Result<ProgressSnapshot> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
