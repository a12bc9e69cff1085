//! Output module for progress reporting and crawl summaries
//!
//! This module handles:
//! - Atomic progress snapshots written during a crawl
//! - Printing statistics from the domain database

mod snapshot;
pub mod stats;

pub use snapshot::{load_snapshot, ProgressSnapshot, Reporter, SNAPSHOT_FILE};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
