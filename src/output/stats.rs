//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::Result;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Number of registered domains
    pub unique_domains: u64,

    /// Domains per server, largest first
    pub servers: Vec<(String, u64)>,

    /// Total entries in the error log
    pub total_errors: u64,

    /// Errors per kind, largest first
    pub errors_by_kind: Vec<(String, u64)>,

    /// The most recent crawl run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics> {
    Ok(CrawlStatistics {
        unique_domains: storage.count_domains()?,
        servers: storage.server_breakdown()?,
        total_errors: storage.count_errors()?,
        errors_by_kind: storage.error_breakdown()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Unique domains: {}", stats.unique_domains);
    println!("  Errors logged: {}", stats.total_errors);
    println!();

    if !stats.servers.is_empty() {
        println!("Domains by Server:");
        for (server, count) in &stats.servers {
            let percentage = (*count as f64 / stats.unique_domains.max(1) as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", server, count, percentage);
        }
        println!();
    }

    if !stats.errors_by_kind.is_empty() {
        println!("Error Summary:");
        for (kind, count) in &stats.errors_by_kind {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run (#{}):", run.id);
            println!("  Seed: {}", run.seed);
            println!("  Mode: {}", run.mode);
            println!("  Status: {}", run.status);
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
        }
        None => println!("No crawl runs recorded"),
    }
}
