//! Per-URL processing shared by both executors
//!
//! `CrawlEngine` owns every piece of crawl state. Executors only decide how
//! many [`CrawlEngine::process`] calls run at once.
//!
//! Lock discipline: the registry, frontier, stats and error-log locks are each
//! taken on their own and never nested, except that a snapshot reads the
//! frontier counters before taking the stats lock.

use crate::crawler::executor::Throttle;
use crate::crawler::fetcher::{ErrorKind, FetchError, FetchResult, Fetcher};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::parser::{extract_links, is_html};
use crate::governor::{GovernorAction, ResourceGovernor};
use crate::output::{ProgressSnapshot, Reporter};
use crate::registry::DomainRegistry;
use crate::state::{CrawlStats, CrawlStatus};
use crate::storage::{ErrorRecord, SqliteStorage, Storage};
use crate::url::{extract_host, normalize_url, registrable_domain, LinkFilter};
use crate::{CrawlError, Result};
use chrono::Utc;
use ::governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Why the crawl stopped before the frontier drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DomainLimit,
    RuntimeLimit,
    ResourceExhausted,
    Interrupted,
    InternalError,
}

pub struct CrawlEngine {
    pub(crate) fetcher: Fetcher,
    pub(crate) frontier: Frontier,
    pub(crate) registry: DomainRegistry,
    pub(crate) filter: LinkFilter,
    pub(crate) governor: ResourceGovernor,
    pub(crate) reporter: Reporter,
    pub(crate) error_log: Mutex<SqliteStorage>,
    pub(crate) stats: Mutex<CrawlStats>,
    pub(crate) throttle: Throttle,
    pub(crate) rate_limiter: Option<DefaultDirectRateLimiter>,
    /// Spaces fetches to the same host
    pub(crate) host_limiter: Option<DefaultKeyedRateLimiter<String>>,
    pub(crate) stop: CancellationToken,
    pub(crate) stop_reason: Mutex<Option<StopReason>>,
    pub(crate) fatal: Mutex<Option<CrawlError>>,
    pub(crate) processed: AtomicU64,
    pub(crate) max_links_per_page: usize,
    pub(crate) check_interval: u64,
    pub(crate) checkpoint_every: u64,
}

impl CrawlEngine {
    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.stop_reason.lock()
    }

    /// Asks every worker to wind down; the first reason recorded wins
    pub fn request_stop(&self, reason: StopReason) {
        {
            let mut current = self.stop_reason.lock();
            if current.is_some() {
                return;
            }
            *current = Some(reason);
        }

        tracing::info!("Stopping crawl: {:?}", reason);
        self.frontier.close();
        self.stop.cancel();
    }

    pub fn take_fatal(&self) -> Option<CrawlError> {
        self.fatal.lock().take()
    }

    /// Fetches one entry, registers its domain and feeds its links back
    ///
    /// Never fails: internal errors stop the crawl and are surfaced by the
    /// coordinator through [`CrawlEngine::take_fatal`].
    pub async fn process(&self, entry: FrontierEntry) {
        if let Err(e) = self.process_entry(&entry).await {
            tracing::error!("Internal error while processing {}: {}", entry.url, e);
            self.fatal.lock().get_or_insert(e);
            self.request_stop(StopReason::InternalError);
        }

        self.frontier.complete();
        self.after_processed(&entry);
    }

    async fn process_entry(&self, entry: &FrontierEntry) -> Result<()> {
        if let Some(limiter) = &self.rate_limiter {
            tokio::select! {
                _ = self.stop.cancelled() => return Ok(()),
                _ = limiter.until_ready() => {}
            }
        }
        if let (Some(limiter), Some(host)) = (&self.host_limiter, extract_host(&entry.url)) {
            tokio::select! {
                _ = self.stop.cancelled() => return Ok(()),
                _ = limiter.until_key_ready(&host) => {}
            }
        }

        tracing::debug!("Fetching {} (depth {})", entry.url, entry.depth);

        let fetched = tokio::select! {
            _ = self.stop.cancelled() => {
                tracing::debug!("Abandoned in-flight fetch of {}", entry.url);
                return Ok(());
            }
            result = self.fetcher.fetch(&entry.url) => result,
        };

        match fetched {
            Ok(page) => self.handle_page(entry, page),
            Err(e) => self.handle_failure(entry, e),
        }
    }

    fn handle_page(&self, entry: &FrontierEntry, page: FetchResult) -> Result<()> {
        self.stats.lock().record_crawled();

        // The server header belongs to whoever answered after redirects
        let Some(host) = extract_host(&page.final_url) else {
            return Ok(());
        };
        if self.filter.is_blacklisted(&host) {
            tracing::debug!("{} redirected to blacklisted {}", entry.url, host);
            return Ok(());
        }
        let domain = registrable_domain(&host);
        if domain != entry.domain {
            tracing::debug!("{} redirected from {} to {}", entry.url, entry.domain, domain);
        }

        match self.registry.register(&domain, &page.server)? {
            Some(registration) if registration.is_new => {
                tracing::info!(
                    "New domain #{}: {} [{}]",
                    registration.domain.id,
                    registration.domain.domain,
                    if page.server.is_empty() { "unknown" } else { page.server.as_str() }
                );
                self.stats.lock().record_new_domain(&page.server);
                self.write_snapshot();

                if self.registry.limit_reached() {
                    self.request_stop(StopReason::DomainLimit);
                }
            }
            Some(_) => {}
            None => {
                self.request_stop(StopReason::DomainLimit);
                return Ok(());
            }
        }

        if entry.depth >= self.frontier.max_depth() || self.is_stopping() {
            return Ok(());
        }
        if !is_html(page.content_type.as_deref()) {
            return Ok(());
        }

        let links = match extract_links(&page.body, &page.final_url) {
            Ok(links) => links,
            Err(e) => {
                tracing::debug!("No links from {}: {}", page.final_url, e);
                self.stats.lock().record_parse_error();
                return Ok(());
            }
        };

        let mut accepted = 0;
        for link in links {
            if accepted >= self.max_links_per_page {
                break;
            }

            let Ok(url) = normalize_url(&link) else {
                continue;
            };
            let Some(host) = extract_host(&url) else {
                continue;
            };
            if !self.filter.accepts(&url, &host) {
                continue;
            }
            accepted += 1;

            let domain = registrable_domain(&host);
            // Ranked only once registered; bounded by the domain limit
            if self.registry.contains(&domain) {
                self.stats.lock().record_reference(&domain);
            }
            self.frontier.enqueue(url, entry.depth + 1, &domain, &host);
        }

        tracing::debug!("Accepted {} links from {}", accepted, page.final_url);
        Ok(())
    }

    fn handle_failure(&self, entry: &FrontierEntry, error: FetchError) -> Result<()> {
        tracing::warn!("Giving up on {}: {}", entry.url, error);

        self.stats.lock().record_error();
        self.log_error(entry.url.as_str(), error.kind, &error.message)
    }

    fn log_error(&self, url: &str, kind: ErrorKind, message: &str) -> Result<()> {
        self.error_log.lock().append_error(&ErrorRecord {
            timestamp: Utc::now().to_rfc3339(),
            url: url.to_string(),
            error_kind: kind.as_str().to_string(),
            message: message.to_string(),
        })?;
        Ok(())
    }

    fn after_processed(&self, entry: &FrontierEntry) {
        let processed = self.processed.fetch_add(1, Ordering::AcqRel) + 1;

        if processed % self.check_interval == 0 {
            self.poll_governor(entry);
        }
        if processed % self.checkpoint_every == 0 {
            self.write_snapshot();
        }
    }

    fn poll_governor(&self, entry: &FrontierEntry) {
        if let Some(limiter) = &self.host_limiter {
            limiter.retain_recent();
        }

        let action = match (
            self.governor.checkpoint(&self.frontier),
            self.governor.cache_usage(),
        ) {
            (Ok(memory), Ok(cache)) => memory.max(cache),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Resource check failed: {}", e);
                return;
            }
        };

        match action {
            GovernorAction::Continue => {
                if self.throttle.target() < self.throttle.max() {
                    let target = self.throttle.relax();
                    tracing::debug!("Pressure eased, concurrency target {}", target);
                }
            }
            GovernorAction::Pause => {
                let target = self.throttle.shed();
                tracing::warn!("Shedding concurrency, target now {}", target);
            }
            GovernorAction::Abort => {
                tracing::error!("Resource limit exceeded, aborting crawl");
                if let Err(e) = self.log_error(
                    entry.url.as_str(),
                    ErrorKind::ResourceExhausted,
                    &format!(
                        "resource limit exceeded at {} bytes resident",
                        self.governor.last_memory_bytes()
                    ),
                ) {
                    tracing::warn!("Failed to record resource error: {}", e);
                }
                self.request_stop(StopReason::ResourceExhausted);
            }
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let hosts = self.frontier.host_count();
        let queued = self.frontier.len();
        let stats = self.stats.lock();
        ProgressSnapshot::capture(&stats, self.governor.last_memory_bytes(), hosts, queued)
    }

    /// Periodic snapshot; a failed write is logged and the crawl goes on
    pub fn write_snapshot(&self) {
        if let Err(e) = self.reporter.report(&self.snapshot()) {
            tracing::warn!("Failed to write progress snapshot: {}", e);
        }
    }

    /// Records the terminal status and writes the final snapshot
    pub fn finish(&self, status: CrawlStatus) -> Result<ProgressSnapshot> {
        self.stats.lock().finish(status);
        let snapshot = self.snapshot();
        self.reporter.report(&snapshot)?;
        Ok(snapshot)
    }

    pub fn urls_crawled(&self) -> u64 {
        self.stats.lock().urls_crawled
    }

    pub fn error_count(&self) -> u64 {
        self.stats.lock().error_count
    }
}
