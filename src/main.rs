//! Domain-Reach main entry point
//!
//! This is the command-line interface for the Domain-Reach domain discovery crawler.

use anyhow::Context;
use clap::Parser;
use domain_reach::config::{load_or_default, Config};
use domain_reach::crawler::{Coordinator, CrawlRequest, ExecutionMode, FetchOptions};
use domain_reach::output::{load_statistics, print_statistics};
use domain_reach::storage::open_storage;
use domain_reach::verify::Verifier;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Domain-Reach: a resumable domain discovery crawler
///
/// Follows links outward from a seed URL and records every new registrable
/// domain with the server software it reports. Rerunning with the same data
/// directory resumes where the previous run stopped.
#[derive(Parser, Debug)]
#[command(name = "domain-reach")]
#[command(version)]
#[command(about = "A resumable domain discovery crawler", long_about = None)]
struct Cli {
    /// Seed URL to start crawling from
    #[arg(value_name = "SEED", required_unless_present_any = ["dry_run", "stats", "verify"])]
    seed: Option<String>,

    /// Path to TOML configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Concurrency model
    #[arg(short, long, value_enum, default_value_t = ExecutionMode::Pool)]
    mode: ExecutionMode,

    /// Ignore the domain limit and use the unlimited depth
    #[arg(long)]
    unlimited: bool,

    /// Clear previously discovered domains and errors before crawling
    #[arg(long)]
    fresh: bool,

    /// Validate config and print the effective settings without crawling
    #[arg(long, conflicts_with_all = ["stats", "verify"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "verify"])]
    stats: bool,

    /// Recheck every registered domain for reachability and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    verify: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let (config, config_hash) =
        load_or_default(cli.config.as_deref()).context("failed to load configuration")?;
    match &cli.config {
        Some(path) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            config_hash
        ),
        None => tracing::info!("Using default configuration (hash: {})", config_hash),
    }

    if cli.dry_run {
        handle_dry_run(&config)?;
        return Ok(0);
    }
    if cli.stats {
        handle_stats(&config)?;
        return Ok(0);
    }
    if cli.verify {
        handle_verify(&config).await?;
        return Ok(0);
    }

    let seed = cli.seed.context("a seed URL is required")?;
    handle_crawl(
        config,
        CrawlRequest {
            seed,
            mode: cli.mode,
            unlimited: cli.unlimited,
            fresh: cli.fresh,
        },
    )
    .await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("domain_reach=info,warn"),
            1 => EnvFilter::new("domain_reach=debug,info"),
            2 => EnvFilter::new("domain_reach=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Domain-Reach Dry Run ===\n");
    println!("User-Agent: {}\n", config.user_agent.header_value());
    println!(
        "{}",
        toml::to_string_pretty(config).context("failed to render configuration")?
    );
    println!("✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let data_dir = Path::new(&config.output.data_dir);
    println!("Data directory: {}\n", data_dir.display());

    let storage = open_storage(data_dir)
        .with_context(|| format!("failed to open database in {}", data_dir.display()))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --verify mode: rechecks registered domains and stores results
async fn handle_verify(config: &Config) -> anyhow::Result<()> {
    let data_dir = Path::new(&config.output.data_dir);
    let mut storage = open_storage(data_dir)
        .with_context(|| format!("failed to open database in {}", data_dir.display()))?;

    let verifier = Verifier::new(
        &FetchOptions::from_config(&config.crawler),
        &config.user_agent.header_value(),
        config.crawler.workers as usize,
    )
    .context("failed to build HTTP client")?;
    let summary = verifier.verify_all(&mut storage).await?;

    println!("=== Domain Verification ===\n");
    println!("Checked:        {}", summary.checked);
    println!("Accessible:     {}", summary.accessible);
    println!("Not accessible: {}", summary.not_accessible);
    println!("Skipped:        {}", summary.skipped);

    Ok(())
}

/// Handles the main crawl operation and returns the process exit code
async fn handle_crawl(config: Config, request: CrawlRequest) -> anyhow::Result<i32> {
    if request.fresh {
        tracing::info!("Starting fresh crawl (clearing previous state)");
    } else {
        tracing::info!("Starting crawl (will resume from registered domains)");
    }

    let coordinator = Coordinator::new(config, request).context("failed to start crawl")?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing up");
                shutdown.cancel();
            }
        });
    }

    let outcome = coordinator.run(shutdown).await.context("crawl failed")?;
    tracing::info!("Crawl finished: {:?}", outcome);

    Ok(outcome.exit_code())
}
