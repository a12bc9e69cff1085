//! Configuration module for Domain-Reach
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every option has a default, so the crawler also runs without a file.
//!
//! # Example
//!
//! ```no_run
//! use domain_reach::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, FilterConfig, OutputConfig, ResourceConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, hash_config, load_config, load_config_with_hash, load_or_default,
};
pub use validation::validate;
