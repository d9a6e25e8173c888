//! WinWorld Harvester main entry point
//!
//! This is the command-line interface for the metadata crawler and
//! mirror-aware downloader.

use anyhow::Context;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use winworld_harvester::config::{load_config_with_hash, Config, MirrorDirectory};
use winworld_harvester::crawler::run_crawl;
use winworld_harvester::downloader::run_downloads;
use winworld_harvester::output::{
    print_crawl_statistics, print_statistics, CrawlEvent, MetadataStatistics,
};
use winworld_harvester::storage::{mirror_link_count, JsonStorage, Product, Storage};

/// WinWorld Harvester: a paced metadata crawler and mirror-aware downloader
///
/// Crawls the library's product, version and download pages into a JSON
/// metadata tree, then downloads every mirrored file under per-mirror
/// concurrency limits with periodic network-identity rotation.
#[derive(Parser, Debug)]
#[command(name = "winworld-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A paced metadata crawler and mirror-aware downloader", long_about = None)]
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

    /// Crawl and save the metadata, without downloading
    #[arg(long, conflicts_with_all = ["download_only", "dry_run", "stats"])]
    crawl_only: bool,

    /// Download from previously saved metadata, without crawling
    #[arg(long, conflicts_with_all = ["crawl_only", "dry_run", "stats"])]
    download_only: bool,

    /// Validate config and show the resolved settings without any network access
    #[arg(long, conflicts_with_all = ["stats", "crawl_only", "download_only"])]
    dry_run: bool,

    /// Show statistics for the saved metadata and exit
    #[arg(long, conflicts_with_all = ["dry_run", "crawl_only", "download_only"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    if cli.stats {
        return handle_stats(&config);
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());

    if cli.download_only {
        let products = load_metadata(&config)?;
        return handle_download(&config, &products, cancel).await;
    }

    let products = handle_crawl(&config, cancel.clone(), cli.quiet).await?;

    match products {
        Some(products) if !cli.crawl_only => {
            if cancel.is_cancelled() {
                tracing::info!("Stop requested; skipping downloads");
                return Ok(());
            }
            handle_download(&config, &products, cancel).await
        }
        _ => Ok(()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("winworld_harvester=info,warn"),
            1 => EnvFilter::new("winworld_harvester=debug,info"),
            2 => EnvFilter::new("winworld_harvester=trace,debug"),
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

/// Cancels the token on the first Ctrl-C
fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current request");
            cancel.cancel();
        }
    });
}

/// Handles the --dry-run mode: validates config and shows the resolved settings
fn handle_dry_run(config: &Config) {
    println!("=== WinWorld Harvester Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    match config.site.library_url() {
        Ok(url) => println!("  Library page: {}", url),
        Err(e) => println!("  Library page: invalid ({})", e),
    }
    println!("  Product prefix: {}", config.site.product_prefix);

    println!("\nCrawler:");
    println!(
        "  Request delay: {} ({:?})",
        config.crawler.request_delay,
        config.crawler.request_delay.to_duration()
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!("  User agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Metadata: {}", config.output.metadata_path.display());
    println!("  Save partial crawls: {}", config.output.save_partial);

    let downloader = &config.downloader;
    println!("\nDownloader:");
    println!("  Base directory: {}", downloader.base_dir.display());
    println!("  Max per mirror: {}", downloader.max_per_mirror);
    println!("  Max concurrent transfers: {}", downloader.max_concurrent_transfers);
    println!("  Rotation interval: {}", downloader.rotation_interval);
    println!("  Stabilization delay: {}s", downloader.stabilization_delay_secs);
    println!("  Transfer idle timeout: {}s", downloader.transfer_timeout_secs);

    let rotation = &config.rotation;
    println!("\nRotation:");
    if rotation.enabled {
        println!(
            "  Command: {} {} <{}..={}>",
            rotation.command,
            rotation.args.join(" "),
            rotation.min_id,
            rotation.max_id
        );
        println!("  Timeout: {}s", rotation.timeout_secs);
    } else {
        println!("  Disabled");
    }

    let mirrors = MirrorDirectory::from_entries(&config.mirrors);
    println!("\nMirrors ({}):", mirrors.len());
    for (id, name) in mirrors.entries() {
        println!("  - {} -> {}", id, name);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics for the saved metadata
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Metadata: {}\n", config.output.metadata_path.display());

    let products = load_metadata(config)?;
    print_statistics(&MetadataStatistics::from_products(&products));

    Ok(())
}

fn load_metadata(config: &Config) -> anyhow::Result<Vec<Product>> {
    let storage = JsonStorage::new(&config.output.metadata_path);
    let products = storage.load().with_context(|| {
        format!(
            "Failed to load metadata from {}",
            config.output.metadata_path.display()
        )
    })?;
    tracing::info!(
        "Loaded {} products ({} mirror links) from {}",
        products.len(),
        mirror_link_count(&products),
        storage.path().display()
    );
    Ok(products)
}

/// Runs the crawl and persists the result
///
/// Returns `None` when a cancelled crawl was not saved.
async fn handle_crawl(
    config: &Config,
    cancel: CancellationToken,
    quiet: bool,
) -> anyhow::Result<Option<Vec<Product>>> {
    let mirrors = MirrorDirectory::from_entries(&config.mirrors);
    let (events, receiver) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(receiver, quiet));

    let outcome = run_crawl(config, mirrors, cancel, Some(events)).await;
    if let Err(e) = renderer.await {
        tracing::debug!("Progress renderer stopped: {}", e);
    }
    let outcome = outcome.context("Crawl failed")?;

    if !quiet {
        print_crawl_statistics(&outcome.statistics);
    }

    if outcome.cancelled && !config.output.save_partial {
        tracing::warn!(
            "Crawl cancelled; partial results not saved (enable output.save-partial to keep them)"
        );
        return Ok(None);
    }

    let storage = JsonStorage::new(&config.output.metadata_path);
    if let Err(e) = storage.save(&outcome.products) {
        tracing::error!("Failed to save metadata: {}", e);
        return Err(winworld_harvester::HarvestError::from(e).into());
    }

    Ok(Some(outcome.products))
}

async fn handle_download(
    config: &Config,
    products: &[Product],
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let summary = run_downloads(config, products, cancel)
        .await
        .context("Failed to start downloads")?;

    if !summary.rotations.is_empty() {
        let failed = summary.rotations.iter().filter(|r| !r.succeeded && !r.skipped).count();
        tracing::info!(
            "{} identity rotations ({} failed)",
            summary.rotations.len(),
            failed
        );
    }

    Ok(())
}

/// Draws the two nested crawl progress bars from the event channel
async fn render_progress(mut events: UnboundedReceiver<CrawlEvent>, hidden: bool) {
    let multi = MultiProgress::new();
    if hidden {
        multi.set_draw_target(ProgressDrawTarget::hidden());
    }

    let overall = multi.add(progress_bar("Overall"));
    let inner = multi.add(progress_bar("Versions"));

    while let Some(event) = events.recv().await {
        match event {
            CrawlEvent::Status(message) => inner.set_message(message),
            CrawlEvent::Overall(pct) => overall.set_position(u64::from(pct)),
            CrawlEvent::Inner(pct) => inner.set_position(u64::from(pct)),
        }
    }

    overall.finish();
    inner.finish();
}

fn progress_bar(prefix: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{prefix:>8} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.set_prefix(prefix);
    bar
}
