//! Site-Harvester main entry point
//!
//! This is the command-line interface for the Site-Harvester resource crawler.

use anyhow::Context;
use clap::Parser;
use site_harvester::config::{load_config_with_hash, Config};
use site_harvester::crawler::run_crawl;
use site_harvester::storage::open_history;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Site-Harvester: a configurable recursive resource crawler
///
/// Site-Harvester walks a site as described by a tree of navigation and
/// container rules, and downloads every resource it finds exactly once,
/// remembering what it already collected across runs.
#[derive(Parser, Debug)]
#[command(name = "site-harvester")]
#[command(version)]
#[command(about = "A configurable recursive resource crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the site trees without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show what the download history holds and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        Ok(())
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
            0 => EnvFilter::new("site_harvester=info,warn"),
            1 => EnvFilter::new("site_harvester=debug,info"),
            2 => EnvFilter::new("site_harvester=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Site-Harvester Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Queue capacity: {}", config.crawler.queue_capacity());
    println!("  Store directory: {}", config.crawler.store_dir);
    println!(
        "  Retry: {} attempts, {}ms apart",
        config.retry.max_attempts, config.retry.delay_ms
    );

    println!("\nHistory:");
    println!("  Backend: {:?}", config.history.backend);
    println!("  Path: {}", config.history.path);
    println!("  Source id: {}", config.history.source_id);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);

    println!("\nSites ({}):", config.sites.len());
    for site in &config.sites {
        for line in site.render_tree().lines() {
            println!("  {}", line);
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: summarizes the download history
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let history = open_history(&config.history).context("failed to open the download history")?;

    println!("History: {} ({:?})", config.history.path, config.history.backend);
    println!("Source id: {}\n", history.source_id());
    println!("Resources collected: {}", history.len());

    let mut by_extension: BTreeMap<String, usize> = BTreeMap::new();
    for entry in history.entries() {
        *by_extension.entry(entry.extension).or_default() += 1;
    }
    for (extension, count) in &by_extension {
        println!("  .{:<8} {}", extension, count);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping workers");
            on_interrupt.cancel();
        }
    });

    let stats = run_crawl(config, cancel).await.context("crawl failed")?;
    if stats.aborted {
        anyhow::bail!("crawl aborted after a worker failure: {}", stats);
    }
    if stats.cancelled {
        tracing::warn!("Crawl interrupted: {}", stats);
    } else {
        tracing::info!("Crawl completed successfully: {}", stats);
    }
    Ok(())
}
