//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `VisitedSet`: URL, host and settled-domain deduplication sets
//! - `CrawlStats`: progress counters mutated by the coordinator
//! - `CrawlStatus`: lifecycle status of a run

mod stats;
mod visited;

pub use stats::{CrawlStats, CrawlStatus, RECENT_WINDOW};
pub use visited::VisitedSet;
