//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl lifecycle that coordinates all aspects of
//! the crawling process, including:
//! - Opening storage and reloading the registry for resume
//! - Seeding the frontier
//! - Handing the engine to the selected executor
//! - Runtime cap and external cancellation
//! - The final snapshot and run record

use crate::config::{hash_config, validate, Config};
use crate::crawler::engine::{CrawlEngine, StopReason};
use crate::crawler::executor::{ExecutionMode, TaskExecutor, Throttle};
use crate::crawler::fetcher::{FetchOptions, Fetcher};
use crate::crawler::frontier::{EnqueueOutcome, Frontier};
use crate::governor::ResourceGovernor;
use crate::output::{ProgressSnapshot, Reporter};
use crate::registry::DomainRegistry;
use crate::state::{CrawlStats, CrawlStatus, VisitedSet};
use crate::storage::{open_storage, SqliteStorage, Storage};
use crate::url::{extract_host, normalize_url, registrable_domain, LinkFilter};
use crate::{CrawlError, Result};
use ::governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// What to crawl and how
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// Absolute seed URL
    pub seed: String,

    pub mode: ExecutionMode,

    /// Ignore the domain limit and use the unlimited depth
    pub unlimited: bool,

    /// Discard previously registered domains and logged errors first
    pub fresh: bool,
}

impl CrawlRequest {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            mode: ExecutionMode::default(),
            unlimited: false,
            fresh: false,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Frontier drained, domain limit reached or runtime cap hit
    Completed,
    /// The seed could not be fetched and nothing else was crawled
    SeedUnreachable,
    /// The resource governor aborted the run
    ResourceExhausted,
    /// Stopped by an external signal
    Interrupted,
}

impl CrawlOutcome {
    /// Terminal status recorded for this outcome
    pub fn status(&self) -> CrawlStatus {
        match self {
            Self::Completed => CrawlStatus::Completed,
            Self::SeedUnreachable | Self::ResourceExhausted => CrawlStatus::Failed,
            Self::Interrupted => CrawlStatus::Interrupted,
        }
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::SeedUnreachable => 2,
            Self::ResourceExhausted => 3,
            Self::Interrupted => 130,
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    engine: Arc<CrawlEngine>,
    executor: Box<dyn TaskExecutor>,
    runs: SqliteStorage,
    run_id: i64,
    seed: Url,
    max_runtime: Option<Duration>,
}

impl Coordinator {
    /// Creates a coordinator with an HTTP client built from `config`
    pub fn new(config: Config, request: CrawlRequest) -> Result<Self> {
        let options = FetchOptions::from_config(&config.crawler);
        let fetcher = Fetcher::new(options, &config.user_agent.header_value())?;
        Self::with_fetcher(config, request, fetcher)
    }

    /// Creates a coordinator around a prebuilt fetcher
    ///
    /// Opens (or creates) the data directory, clears it when `fresh` is set,
    /// reloads the registry and records a new run.
    pub fn with_fetcher(config: Config, request: CrawlRequest, fetcher: Fetcher) -> Result<Self> {
        validate(&config)?;

        let seed = normalize_url(&request.seed)?;
        let data_dir = PathBuf::from(&config.output.data_dir);

        let mut runs = open_storage(&data_dir)?;
        if request.fresh {
            tracing::info!("Fresh crawl requested, clearing {}", data_dir.display());
            runs.clear_all()?;
        }

        let (limit, max_depth) = if request.unlimited {
            (None, config.crawler.unlimited_max_depth)
        } else {
            (Some(config.crawler.domain_limit), config.crawler.max_depth)
        };

        let registry = DomainRegistry::load(open_storage(&data_dir)?, limit)?;
        let known = registry.domain_names();
        let known_count = known.len() as u64;
        if known_count > 0 {
            tracing::info!("Resuming with {} registered domains", known_count);
        }

        let rate_limiter = NonZeroU32::new(config.crawler.max_urls_per_second)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));
        let host_limiter =
            Quota::with_period(Duration::from_millis(config.crawler.domain_delay_ms))
                .map(RateLimiter::keyed);

        let workers = config.crawler.workers as usize;
        let engine = CrawlEngine {
            fetcher,
            frontier: Frontier::new(max_depth, VisitedSet::with_settled(known)),
            registry,
            filter: LinkFilter::new(&config.filters),
            governor: ResourceGovernor::new(&config.resources, &data_dir)?,
            reporter: Reporter::new(&data_dir),
            error_log: Mutex::new(open_storage(&data_dir)?),
            stats: Mutex::new(CrawlStats::new(known_count)),
            throttle: Throttle::new(workers),
            rate_limiter,
            host_limiter,
            stop: CancellationToken::new(),
            stop_reason: Mutex::new(None),
            fatal: Mutex::new(None),
            processed: AtomicU64::new(0),
            max_links_per_page: config.crawler.max_links_per_page,
            check_interval: config.resources.check_interval.max(1),
            checkpoint_every: config.output.checkpoint_every.max(1),
        };

        let config_hash = hash_config(&config)?;
        let run_id = runs.create_run(seed.as_str(), request.mode.as_str(), &config_hash)?;

        let max_runtime = match config.crawler.max_runtime_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        tracing::info!(
            "Run {} prepared: seed {}, mode {}, max depth {}, domain limit {}",
            run_id,
            seed,
            request.mode,
            max_depth,
            limit.map_or_else(|| "unlimited".to_string(), |l| l.to_string())
        );

        Ok(Self {
            engine: Arc::new(engine),
            executor: request.mode.executor(workers),
            runs,
            run_id,
            seed,
            max_runtime,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Current progress without waiting for the next checkpoint
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.engine.snapshot()
    }

    /// Runs the crawl to its end
    ///
    /// Cancelling `shutdown` abandons in-flight fetches and ends the run as
    /// [`CrawlOutcome::Interrupted`]. The final snapshot and run record are
    /// written on every outcome.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<CrawlOutcome> {
        let engine = Arc::clone(&self.engine);
        tracing::info!(
            "Starting crawl run {} with {:?} executor",
            self.run_id,
            self.executor.mode()
        );

        self.seed_frontier();
        engine.write_snapshot();

        let interrupt = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                shutdown.cancelled().await;
                engine.request_stop(StopReason::Interrupted);
            })
        };
        let deadline = self.max_runtime.map(|limit| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::info!("Maximum runtime of {:?} reached", limit);
                engine.request_stop(StopReason::RuntimeLimit);
            })
        });

        let result = if engine.is_stopping() {
            Ok(())
        } else {
            self.executor.run(Arc::clone(&engine)).await
        };

        interrupt.abort();
        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let fatal = match result {
            Err(e) => Some(e),
            Ok(()) => engine.take_fatal(),
        };
        if let Some(error) = fatal {
            tracing::error!("Crawl failed: {}", error);
            self.finish(CrawlStatus::Failed)?;
            return Err(error);
        }

        let outcome = match engine.stop_reason() {
            Some(StopReason::ResourceExhausted) => CrawlOutcome::ResourceExhausted,
            Some(StopReason::Interrupted) => CrawlOutcome::Interrupted,
            Some(StopReason::DomainLimit) | Some(StopReason::RuntimeLimit) => {
                CrawlOutcome::Completed
            }
            Some(StopReason::InternalError) => {
                self.finish(CrawlStatus::Failed)?;
                return Err(CrawlError::Worker(
                    "crawl stopped after an internal error".to_string(),
                ));
            }
            None if engine.urls_crawled() == 0 && engine.error_count() > 0 => {
                CrawlOutcome::SeedUnreachable
            }
            None => CrawlOutcome::Completed,
        };

        let snapshot = self.finish(outcome.status())?;
        tracing::info!(
            "Crawl {:?}: {} URLs, {} domains, {} errors in {:.1}s",
            outcome,
            snapshot.urls_crawled,
            snapshot.unique_domains,
            snapshot.errors,
            snapshot.elapsed_secs
        );

        Ok(outcome)
    }

    fn seed_frontier(&self) {
        let engine = &self.engine;

        if engine.registry().limit_reached() {
            tracing::info!("Domain limit already reached by earlier runs");
            engine.request_stop(StopReason::DomainLimit);
            return;
        }

        let Some(host) = extract_host(&self.seed) else {
            return;
        };
        let domain = registrable_domain(&host);

        match engine
            .frontier()
            .enqueue(self.seed.clone(), 0, &domain, &host)
        {
            EnqueueOutcome::Queued => tracing::debug!("Seeded frontier with {}", self.seed),
            EnqueueOutcome::Settled => {
                tracing::info!("Seed domain {} already registered, nothing to crawl", domain)
            }
            other => tracing::warn!("Seed {} not queued: {:?}", self.seed, other),
        }
    }

    fn finish(&mut self, status: CrawlStatus) -> Result<ProgressSnapshot> {
        let snapshot = self.engine.finish(status)?;
        self.runs.finish_run(self.run_id, status)?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(CrawlOutcome::Completed.exit_code(), 0);
        assert_eq!(CrawlOutcome::SeedUnreachable.exit_code(), 2);
        assert_eq!(CrawlOutcome::ResourceExhausted.exit_code(), 3);
        assert_eq!(CrawlOutcome::Interrupted.exit_code(), 130);
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(CrawlOutcome::Completed.status(), CrawlStatus::Completed);
        assert_eq!(CrawlOutcome::ResourceExhausted.status(), CrawlStatus::Failed);
        assert_eq!(CrawlOutcome::Interrupted.status(), CrawlStatus::Interrupted);
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.data_dir = temp.path().to_string_lossy().to_string();

        let result = Coordinator::new(config, CrawlRequest::new("ftp://example.com/"));
        assert!(matches!(result, Err(CrawlError::Url(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.data_dir = temp.path().to_string_lossy().to_string();
        config.crawler.workers = 0;

        let result = Coordinator::new(config, CrawlRequest::new("https://example.com/"));
        assert!(matches!(result, Err(CrawlError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pool_finishes_after_concurrency_was_shed() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.data_dir = temp.path().to_string_lossy().to_string();
        config.crawler.workers = 4;
        config.crawler.max_retries = 1;

        let coordinator =
            Coordinator::new(config, CrawlRequest::new("http://127.0.0.1:1/")).unwrap();
        assert_eq!(coordinator.engine.throttle().shed(), 2);

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            coordinator.run(CancellationToken::new()),
        )
        .await
        .expect("pool did not finish once the frontier drained")
        .unwrap();

        assert_eq!(outcome, CrawlOutcome::SeedUnreachable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pool_crawls_every_page_after_shed() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let base = server.uri();
        let body = format!(
            r#"<html><body><a href="{0}/a">a</a><a href="{0}/b">b</a></body></html>"#,
            base
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&server)
            .await;

        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.data_dir = temp.path().to_string_lossy().to_string();
        config.crawler.workers = 4;
        config.crawler.domain_delay_ms = 0;
        config.filters.blacklist.clear();

        let coordinator = Coordinator::new(config, CrawlRequest::new(format!("{}/", base))).unwrap();
        coordinator.engine.throttle().shed();
        assert_eq!(coordinator.engine.throttle().shed(), 1);

        let engine = Arc::clone(&coordinator.engine);
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            coordinator.run(CancellationToken::new()),
        )
        .await
        .expect("pool did not finish once the frontier drained")
        .unwrap();

        assert_eq!(outcome, CrawlOutcome::Completed);
        assert_eq!(engine.frontier().url_count(), 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[test]
    fn test_registered_domains_are_settled_in_frontier() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.data_dir = temp.path().to_string_lossy().to_string();

        {
            let registry =
                DomainRegistry::load(open_storage(temp.path()).unwrap(), None).unwrap();
            registry.register("a.com", "nginx").unwrap();
            registry.register("b.org", "apache").unwrap();
        }

        let coordinator =
            Coordinator::new(config, CrawlRequest::new("https://seed.net/")).unwrap();
        let engine = &coordinator.engine;

        for (url, domain) in [("https://www.a.com/x", "a.com"), ("https://b.org/", "b.org")] {
            let url = Url::parse(url).unwrap();
            let host = url.host_str().unwrap().to_string();
            assert_eq!(
                engine.frontier().enqueue(url, 1, domain, &host),
                EnqueueOutcome::Settled
            );
            assert!(engine.registry().contains(domain));
        }
        assert_eq!(engine.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_seed_on_settled_domain_does_no_work() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.data_dir = temp.path().to_string_lossy().to_string();

        {
            let registry =
                DomainRegistry::load(open_storage(temp.path()).unwrap(), None).unwrap();
            registry.register("example.com", "nginx").unwrap();
        }

        let coordinator =
            Coordinator::new(config, CrawlRequest::new("https://www.example.com/")).unwrap();
        let outcome = coordinator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, CrawlOutcome::Completed);
    }
}
