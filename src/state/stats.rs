use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

/// Window used for the recent error rate
pub const RECENT_WINDOW: Duration = Duration::from_secs(30);

/// Lifecycle status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Crawling,
    Completed,
    Failed,
    Interrupted,
}

impl CrawlStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Crawling)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Crawling => "crawling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "crawling" => Some(Self::Crawling),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Progress counters for one crawl run
///
/// Only the coordinator mutates this; the reporter reads it through
/// [`CrawlStats`] accessors when building a snapshot.
#[derive(Debug)]
pub struct CrawlStats {
    pub urls_crawled: u64,
    pub unique_domains: u64,
    pub error_count: u64,
    pub parse_errors: u64,
    pub status: CrawlStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    started: Instant,
    top_servers: HashMap<String, u64>,
    top_domains: HashMap<String, u64>,
    recent_attempts: VecDeque<(Instant, bool)>,
}

impl CrawlStats {
    /// Creates counters for a run that starts with `known_domains` already registered
    pub fn new(known_domains: u64) -> Self {
        Self {
            urls_crawled: 0,
            unique_domains: known_domains,
            error_count: 0,
            parse_errors: 0,
            status: CrawlStatus::Crawling,
            started_at: Utc::now(),
            finished_at: None,
            started: Instant::now(),
            top_servers: HashMap::new(),
            top_domains: HashMap::new(),
            recent_attempts: VecDeque::new(),
        }
    }

    /// Records a fetched-and-processed URL
    pub fn record_crawled(&mut self) {
        self.urls_crawled += 1;
        self.push_attempt(true);
    }

    /// Records a URL whose retry budget was exhausted
    pub fn record_error(&mut self) {
        self.error_count += 1;
        self.push_attempt(false);
    }

    pub fn record_parse_error(&mut self) {
        self.parse_errors += 1;
    }

    /// Records a newly registered domain and the server that answered for it
    pub fn record_new_domain(&mut self, server: &str) {
        self.unique_domains += 1;
        let key = if server.is_empty() { "unknown" } else { server };
        *self.top_servers.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Counts a link pointing at `domain`; callers pass only registered domains
    /// so the table stays bounded by the domain limit
    pub fn record_reference(&mut self, domain: &str) {
        *self.top_domains.entry(domain.to_string()).or_insert(0) += 1;
    }

    pub fn finish(&mut self, status: CrawlStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Processed URLs per second since the run started
    pub fn crawl_rate(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.urls_crawled as f64 / secs
        } else {
            0.0
        }
    }

    /// Fraction of attempts in the last [`RECENT_WINDOW`] that failed
    pub fn recent_error_rate(&self) -> f64 {
        let cutoff = Instant::now().checked_sub(RECENT_WINDOW);
        let (total, failed) = self
            .recent_attempts
            .iter()
            .filter(|(at, _)| cutoff.map_or(true, |c| *at >= c))
            .fold((0u64, 0u64), |(t, f), (_, ok)| (t + 1, f + u64::from(!ok)));

        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        }
    }

    pub fn top_servers(&self, n: usize) -> Vec<(String, u64)> {
        top_n(&self.top_servers, n)
    }

    pub fn top_domains(&self, n: usize) -> Vec<(String, u64)> {
        top_n(&self.top_domains, n)
    }

    fn push_attempt(&mut self, ok: bool) {
        let now = Instant::now();
        self.recent_attempts.push_back((now, ok));
        if let Some(cutoff) = now.checked_sub(RECENT_WINDOW) {
            while self
                .recent_attempts
                .front()
                .is_some_and(|(at, _)| *at < cutoff)
            {
                self.recent_attempts.pop_front();
            }
        }
    }
}

/// Highest counts first, ties broken alphabetically
fn top_n(counts: &HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}
