//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - HTML parsing and link extraction
//! - The shared frontier and per-URL processing
//! - The two task executors
//! - Overall crawl coordination

mod coordinator;
mod engine;
mod executor;
mod fetcher;
mod frontier;
mod parser;

pub use coordinator::{Coordinator, CrawlOutcome, CrawlRequest};
pub use engine::{CrawlEngine, StopReason};
pub use executor::{CooperativeLoop, ExecutionMode, TaskExecutor, Throttle, WorkerPool};
pub use fetcher::{
    backoff_delay, client_builder, ErrorKind, FetchError, FetchOptions, FetchResult, Fetcher,
};
pub use frontier::{Dequeued, EnqueueOutcome, Frontier, FrontierEntry};
pub use parser::{detect_server, extract_links, is_html, ParseError};
