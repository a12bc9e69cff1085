use serde::{Deserialize, Serialize};

/// Main configuration structure for Domain-Reach
///
/// Every section and key has a default, so an empty file (or no file at all)
/// yields a usable configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub resources: ResourceConfig,
    pub output: OutputConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub filters: FilterConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum link depth followed from the seed
    pub max_depth: u32,

    /// Depth limit applied instead of `max_depth` when running unlimited
    pub unlimited_max_depth: u32,

    /// Stop once this many domains are registered (ignored when unlimited)
    pub domain_limit: u64,

    /// Worker threads in pool mode, concurrency permits in cooperative mode
    pub workers: u32,

    /// Connect + read timeout for a single fetch attempt
    pub timeout_secs: u64,

    /// Maximum number of extracted links accepted from one page
    pub max_links_per_page: usize,

    /// Response bodies are truncated to this many bytes
    pub max_response_bytes: usize,

    /// Total attempts per URL, including the first
    pub max_retries: u32,

    /// Base delay between attempts, doubled on each retry
    pub retry_base_delay_ms: u64,

    /// Redirect hops followed within a single attempt
    pub max_redirects: u32,

    /// Global cap on fetch starts per second (0 disables the cap)
    pub max_urls_per_second: u32,

    /// Stop the crawl after this many seconds (0 disables the cap)
    pub max_runtime_secs: u64,

    /// Minimum spacing between fetch starts to the same host (0 disables it)
    pub domain_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            unlimited_max_depth: 10,
            domain_limit: 500,
            workers: 16,
            timeout_secs: 10,
            max_links_per_page: 200,
            max_response_bytes: 2 * 1024 * 1024,
            max_retries: 3,
            retry_base_delay_ms: 500,
            max_redirects: 5,
            max_urls_per_second: 0,
            max_runtime_secs: 0,
            domain_delay_ms: 1000,
        }
    }
}

/// Resource budget configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResourceConfig {
    /// Hard process memory limit in megabytes
    pub memory_limit_mb: u64,

    /// Fraction of the hard limit above which the crawl sheds concurrency
    pub soft_memory_ratio: f64,

    /// Budget for the data directory on disk, in megabytes
    pub cache_limit_mb: u64,

    /// Poll the governor every N processed URLs
    pub check_interval: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 1024,
            soft_memory_ratio: 0.8,
            cache_limit_mb: 2048,
            check_interval: 50,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory holding the domain database and the progress snapshot
    pub data_dir: String,

    /// Write a progress snapshot every N processed URLs
    pub checkpoint_every: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: "./crawl_data".to_string(),
            checkpoint_every: 25,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "DomainReach".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Static link filters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FilterConfig {
    /// Domain patterns (e.g., "example.com" or "*.example.com") never crawled
    pub blacklist: Vec<String>,

    /// File extensions (without the dot) whose URLs are never fetched
    pub skip_extensions: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            skip_extensions: DEFAULT_SKIP_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

const DEFAULT_BLACKLIST: &[&str] = &[
    "*.facebook.com",
    "*.instagram.com",
    "*.twitter.com",
    "*.x.com",
    "*.linkedin.com",
    "*.pinterest.com",
    "*.tiktok.com",
    "*.doubleclick.net",
    "*.googlesyndication.com",
    "*.google-analytics.com",
];

const DEFAULT_SKIP_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp", "css", "js", "json", "pdf", "zip",
    "gz", "tar", "rar", "7z", "exe", "dmg", "iso", "mp3", "mp4", "avi", "mov", "webm", "wav",
    "woff", "woff2", "ttf", "eot", "xml",
];
