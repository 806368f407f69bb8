//! Annuaire-Crawler main entry point
//!
//! This is the command-line interface for the resumable directory crawler.

use annuaire_crawler::config::{load_config_with_hash, validate, Config};
use annuaire_crawler::crawler::crawl;
use annuaire_crawler::output::{load_statistics, print_statistics};
use annuaire_crawler::storage::SqliteFrontier;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Annuaire-Crawler: a resumable hierarchical directory crawler
///
/// Walks the directory's catalog, categories, subcategories and listings,
/// persisting every level so an interrupted run resumes where it stopped,
/// then samples detail records for each listing with a pool of workers.
#[derive(Parser, Debug)]
#[command(name = "annuaire-crawler")]
#[command(version)]
#[command(about = "A resumable hierarchical directory crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Number of listing workers (overrides crawler.workers)
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
        validate(&config).context("Invalid --workers value")?;
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("annuaire_crawler=info,warn"),
            1 => EnvFilter::new("annuaire_crawler=debug,info"),
            2 => EnvFilter::new("annuaire_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Annuaire-Crawler Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Catalog: {}", config.site.catalog_url()?);

    println!("\nDispatcher:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Queue capacity: {}", config.crawler.queue_capacity);

    println!("\nFetch:");
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  Connect timeout: {}s", config.fetch.connect_timeout_secs);
    println!(
        "  Retries: {} (backoff {}ms..{}ms)",
        config.fetch.max_retries, config.fetch.initial_backoff_ms, config.fetch.max_backoff_ms
    );

    println!("\nSampling:");
    println!("  Records per listing: {}", config.sampling.count);
    println!("  Selection: {:?}", config.sampling.selection);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!(
        "  Connections: {} open, {} idle",
        config.storage.max_open_connections, config.storage.max_idle_connections
    );

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let store = SqliteFrontier::from_config(&config.storage)?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // Ctrl-C stops discovery and enqueueing; queued jobs drain as dropped
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            on_interrupt.cancel();
        }
    });

    tracing::info!(
        "Crawling {} with {} workers",
        config.site.base_url,
        config.crawler.workers
    );

    match crawl(config, cancel).await {
        Ok(report) if report.cancelled => {
            tracing::warn!("Crawl interrupted; rerun to resume");
            Ok(())
        }
        Ok(_) => {
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
