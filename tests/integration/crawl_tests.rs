//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use domain_reach::config::Config;
use domain_reach::crawler::{
    client_builder, Coordinator, CrawlOutcome, CrawlRequest, ExecutionMode, FetchOptions, Fetcher,
};
use domain_reach::output::{load_snapshot, SNAPSHOT_FILE};
use domain_reach::state::CrawlStatus;
use domain_reach::storage::{open_storage, Storage};
use std::net::SocketAddr;
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration writing into `data_dir`
fn create_test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.crawler.max_depth = 2;
    config.crawler.workers = 4;
    config.crawler.timeout_secs = 1;
    config.crawler.retry_base_delay_ms = 10;
    config.crawler.domain_delay_ms = 0;
    config.output.data_dir = data_dir.to_string_lossy().to_string();
    config.output.checkpoint_every = 1;
    config.filters.blacklist.clear();
    config
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("server", "nginx")
        .set_body_raw(body, "text/html")
}

fn page(links: &[String]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|link| format!(r#"<a href="{}">link</a>"#, link))
        .collect();
    html(format!("<html><body>{}</body></html>", anchors))
}

async fn crawl(config: Config, request: CrawlRequest) -> CrawlOutcome {
    Coordinator::new(config, request)
        .expect("Failed to create coordinator")
        .run(CancellationToken::new())
        .await
        .expect("Crawl failed")
}

/// Fetcher whose client sends every host in `hosts` to `addr`
fn resolving_fetcher(config: &Config, hosts: &[String], addr: SocketAddr) -> Fetcher {
    let options = FetchOptions::from_config(&config.crawler);
    let client = hosts
        .iter()
        .fold(
            client_builder(&options, &config.user_agent.header_value()),
            |builder, host| builder.resolve(host, addr),
        )
        .build()
        .unwrap();
    Fetcher::with_client(client, options)
}

async fn request_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_domain_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&[format!("{}/a", base), format!("{}/b", base)]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(page(&[format!("{}/", base)]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(page(&[]))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let outcome = crawl(
        create_test_config(temp.path()),
        CrawlRequest::new(format!("{}/", base)),
    )
    .await;

    assert_eq!(outcome, CrawlOutcome::Completed);

    let storage = open_storage(temp.path()).unwrap();
    let domains = storage.load_domains().unwrap();
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0].domain, "127.0.0.1");
    assert_eq!(domains[0].server, "nginx");

    let snapshot = load_snapshot(&temp.path().join(SNAPSHOT_FILE)).unwrap();
    assert_eq!(snapshot.status, CrawlStatus::Completed);
    assert_eq!(snapshot.urls_crawled, 3);
    assert_eq!(snapshot.unique_domains, 1);
    assert_eq!(snapshot.errors, 0);
    assert!(snapshot.finished_at.is_some());

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, CrawlStatus::Completed);
    assert_eq!(run.mode, "pool");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transient_timeouts_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&[]).set_delay(Duration::from_secs(3)))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&[]))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let outcome = crawl(
        create_test_config(temp.path()),
        CrawlRequest::new(format!("{}/", server.uri())),
    )
    .await;

    assert_eq!(outcome, CrawlOutcome::Completed);

    let storage = open_storage(temp.path()).unwrap();
    assert_eq!(storage.count_errors().unwrap(), 0);
    assert_eq!(storage.count_domains().unwrap(), 1);
    assert_eq!(request_paths(&server).await.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_seed_logs_one_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let outcome = crawl(
        create_test_config(temp.path()),
        CrawlRequest::new(format!("{}/", server.uri())),
    )
    .await;

    assert_eq!(outcome, CrawlOutcome::SeedUnreachable);
    assert_eq!(outcome.exit_code(), 2);

    let storage = open_storage(temp.path()).unwrap();
    let errors = storage.load_errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_kind, "http_error");
    assert_eq!(storage.count_domains().unwrap(), 0);

    let snapshot = load_snapshot(&temp.path().join(SNAPSHOT_FILE)).unwrap();
    assert_eq!(snapshot.status, CrawlStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_links_beyond_max_depth_are_not_fetched() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&[format!("{}/level1", base)]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/level1"))
        .respond_with(page(&[format!("{}/level2", base)]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/level2"))
        .respond_with(page(&[]))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(temp.path());
    config.crawler.max_depth = 1;

    let outcome = crawl(config, CrawlRequest::new(format!("{}/", base))).await;

    assert_eq!(outcome, CrawlOutcome::Completed);
    assert_eq!(request_paths(&server).await, vec!["/", "/level1"]);
}

/// Five hostnames that all resolve to the mock server, each linking to the rest
async fn five_domain_crawl(mode: ExecutionMode) {
    let server = MockServer::start().await;
    let addr: SocketAddr = *server.address();
    let hosts: Vec<String> = (1..=5).map(|i| format!("d{}.test", i)).collect();
    let links: Vec<String> = hosts
        .iter()
        .map(|host| format!("http://{}:{}/", host, addr.port()))
        .collect();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&links))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = create_test_config(temp.path());
    let fetcher = resolving_fetcher(&config, &hosts, addr);

    let request = CrawlRequest {
        mode,
        ..CrawlRequest::new(links[0].clone())
    };
    let outcome = Coordinator::with_fetcher(config, request, fetcher)
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, CrawlOutcome::Completed);

    let storage = open_storage(temp.path()).unwrap();
    let mut names: Vec<String> = storage
        .load_domains()
        .unwrap()
        .into_iter()
        .map(|d| d.domain)
        .collect();
    names.sort();
    assert_eq!(names, hosts);
    assert_eq!(
        storage.server_breakdown().unwrap(),
        vec![("nginx".to_string(), 5)]
    );
    assert_eq!(storage.count_errors().unwrap(), 0);

    let snapshot = load_snapshot(&temp.path().join(SNAPSHOT_FILE)).unwrap();
    assert_eq!(snapshot.unique_domains, 5);
    assert_eq!(snapshot.top_servers, vec![("nginx".to_string(), 5)]);
    assert_eq!(snapshot.urls_crawled, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_five_domains_worker_pool() {
    five_domain_crawl(ExecutionMode::Pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_five_domains_cooperative() {
    five_domain_crawl(ExecutionMode::Cooperative).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_domain_limit_stops_crawl() {
    let server = MockServer::start().await;
    let addr: SocketAddr = *server.address();
    let hosts: Vec<String> = (1..=5).map(|i| format!("d{}.test", i)).collect();
    let links: Vec<String> = hosts
        .iter()
        .map(|host| format!("http://{}:{}/", host, addr.port()))
        .collect();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&links))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(temp.path());
    config.crawler.domain_limit = 2;
    config.crawler.workers = 1;
    let fetcher = resolving_fetcher(&config, &hosts, addr);

    let outcome = Coordinator::with_fetcher(config, CrawlRequest::new(links[0].clone()), fetcher)
    .unwrap()
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(outcome, CrawlOutcome::Completed);
    let storage = open_storage(temp.path()).unwrap();
    assert_eq!(storage.count_domains().unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_memory_limit_aborts_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&[format!("{}/next", base)]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(page(&[]))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(temp.path());
    config.resources.memory_limit_mb = 1;
    config.resources.check_interval = 1;
    config.crawler.workers = 1;

    let outcome = crawl(config, CrawlRequest::new(format!("{}/", base))).await;

    assert_eq!(outcome, CrawlOutcome::ResourceExhausted);
    assert_eq!(outcome.exit_code(), 3);

    let storage = open_storage(temp.path()).unwrap();
    let errors = storage.load_errors().unwrap();
    assert!(errors.iter().any(|e| e.error_kind == "resource_exhausted"));

    let snapshot = load_snapshot(&temp.path().join(SNAPSHOT_FILE)).unwrap();
    assert_eq!(snapshot.status, CrawlStatus::Failed);
    assert!(snapshot.memory_bytes > 1024 * 1024);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, CrawlStatus::Failed);

    // Whatever was registered before the abort is intact and consistent
    let domains = storage.load_domains().unwrap();
    let ids: Vec<u64> = domains.iter().map(|d| d.id).collect();
    assert_eq!(ids, (1..=domains.len() as u64).collect::<Vec<_>>());
    let names: HashSet<&str> = domains.iter().map(|d| d.domain.as_str()).collect();
    assert_eq!(names.len(), domains.len());
    assert!(names.iter().all(|name| *name == "127.0.0.1"));
    assert_eq!(snapshot.unique_domains, domains.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_domain_limit_with_fanout_of_three() {
    let server = MockServer::start().await;
    let addr: SocketAddr = *server.address();
    let hosts: Vec<String> = (0..=12).map(|i| format!("d{}.test", i)).collect();
    let link = |i: usize| format!("http://d{}.test:{}/p{}", i, addr.port(), i);

    // Page K on host dK links to the three pages on hosts d(3K+1)..d(3K+3)
    for k in 0..=12 {
        let links: Vec<String> = (3 * k + 1..=3 * k + 3)
            .filter(|i| *i <= 12)
            .map(&link)
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/p{}", k)))
            .respond_with(page(&links))
            .mount(&server)
            .await;
    }

    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(temp.path());
    config.crawler.max_depth = 2;
    config.crawler.domain_limit = 5;
    let fetcher = resolving_fetcher(&config, &hosts, addr);

    let outcome = Coordinator::with_fetcher(config, CrawlRequest::new(link(0)), fetcher)
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, CrawlOutcome::Completed);

    let storage = open_storage(temp.path()).unwrap();
    let domains = storage.load_domains().unwrap();
    assert!(!domains.is_empty());
    assert!(domains.len() <= 5);
    assert!(domains.iter().all(|d| d.server == "nginx"));
    let registered: HashSet<String> = domains.iter().map(|d| d.domain.clone()).collect();
    assert_eq!(registered.len(), domains.len());

    let snapshot = load_snapshot(&temp.path().join(SNAPSHOT_FILE)).unwrap();
    assert_eq!(snapshot.status, CrawlStatus::Completed);
    assert!(snapshot.unique_domains <= 5);
    assert!(snapshot
        .top_domains
        .iter()
        .all(|(name, _)| registered.contains(name)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_redirect_registers_final_domain() {
    let server = MockServer::start().await;
    let addr: SocketAddr = *server.address();
    let hosts = vec!["old.test".to_string(), "new.test".to_string()];

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("server", "nginx")
                .insert_header(
                    "location",
                    format!("http://new.test:{}/landing", addr.port()).as_str(),
                ),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("server", "Apache/2.4")
                .set_body_raw("<html><body></body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = create_test_config(temp.path());
    let fetcher = resolving_fetcher(&config, &hosts, addr);

    let outcome = Coordinator::with_fetcher(
        config,
        CrawlRequest::new(format!("http://old.test:{}/start", addr.port())),
        fetcher,
    )
    .unwrap()
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(outcome, CrawlOutcome::Completed);

    let storage = open_storage(temp.path()).unwrap();
    let domains = storage.load_domains().unwrap();
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0].domain, "new.test");
    assert_eq!(domains[0].server, "Apache/2.4");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_domain_delay_spaces_same_host_fetches() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&[format!("{}/a", base), format!("{}/b", base)]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(page(&[]))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(temp.path());
    config.crawler.domain_delay_ms = 300;

    let started = Instant::now();
    let outcome = crawl(config, CrawlRequest::new(format!("{}/", base))).await;

    assert_eq!(outcome, CrawlOutcome::Completed);
    assert_eq!(request_paths(&server).await.len(), 3);
    // Three fetches to one host need at least two full gaps
    assert!(started.elapsed() >= Duration::from_millis(550));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_skips_registered_domains() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&[format!("{}/about", base)]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(page(&[]))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let seed = format!("{}/", base);

    let first = crawl(create_test_config(temp.path()), CrawlRequest::new(&seed)).await;
    assert_eq!(first, CrawlOutcome::Completed);
    let after_first = request_paths(&server).await.len();
    assert_eq!(after_first, 2);

    let second = crawl(create_test_config(temp.path()), CrawlRequest::new(&seed)).await;
    assert_eq!(second, CrawlOutcome::Completed);
    assert_eq!(request_paths(&server).await.len(), after_first);

    let storage = open_storage(temp.path()).unwrap();
    assert_eq!(storage.count_domains().unwrap(), 1);

    let snapshot = load_snapshot(&temp.path().join(SNAPSHOT_FILE)).unwrap();
    assert_eq!(snapshot.urls_crawled, 0);
    assert_eq!(snapshot.unique_domains, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fresh_run_recrawls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(&[]))
        .expect(2)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let seed = format!("{}/", server.uri());

    crawl(create_test_config(temp.path()), CrawlRequest::new(&seed)).await;

    let request = CrawlRequest {
        fresh: true,
        ..CrawlRequest::new(&seed)
    };
    let outcome = crawl(create_test_config(temp.path()), request).await;

    assert_eq!(outcome, CrawlOutcome::Completed);
    let storage = open_storage(temp.path()).unwrap();
    assert_eq!(storage.count_domains().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_crawl_is_interrupted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(page(&[]).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(temp.path());
    config.crawler.timeout_secs = 60;

    let coordinator =
        Coordinator::new(config, CrawlRequest::new(format!("{}/", server.uri()))).unwrap();
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), coordinator.run(shutdown))
        .await
        .expect("crawl did not stop after cancellation")
        .unwrap();

    assert_eq!(outcome, CrawlOutcome::Interrupted);
    assert_eq!(outcome.exit_code(), 130);

    let snapshot = load_snapshot(&temp.path().join(SNAPSHOT_FILE)).unwrap();
    assert_eq!(snapshot.status, CrawlStatus::Interrupted);
}
