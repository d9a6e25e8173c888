//! Statistics for crawl runs and persisted metadata trees

use crate::state::PageState;
use crate::storage::Product;
use std::collections::{BTreeMap, HashMap};

/// Counters collected while a crawl runs
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Raw product hrefs found on the index page
    pub raw_product_links: u64,

    /// Raw links whose canonical identity was already claimed
    pub duplicates_skipped: u64,

    /// Final state of every unit of work
    pub units_by_state: HashMap<PageState, u64>,

    pub products: u64,
    pub versions: u64,
    pub files: u64,
    pub files_with_mirrors: u64,

    /// HTTP requests issued by the fetcher
    pub requests_sent: u64,

    /// Whether the run stopped on the cancellation signal
    pub cancelled: bool,
}

impl CrawlStatistics {
    pub fn units_in(&self, state: PageState) -> u64 {
        self.units_by_state.get(&state).copied().unwrap_or(0)
    }
}

/// Summary of a persisted metadata tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStatistics {
    pub products: usize,
    pub versions: usize,
    pub files: usize,
    pub files_without_mirrors: usize,

    /// Mirror name -> number of files it serves
    pub files_per_mirror: BTreeMap<String, usize>,
}

impl MetadataStatistics {
    pub fn from_products(products: &[Product]) -> Self {
        let mut stats = Self {
            products: products.len(),
            ..Self::default()
        };

        for version in products.iter().flat_map(|p| &p.versions) {
            stats.versions += 1;
            for file in &version.files {
                stats.files += 1;
                if file.servers.is_empty() {
                    stats.files_without_mirrors += 1;
                }
                for mirror in file.servers.keys() {
                    *stats.files_per_mirror.entry(mirror.clone()).or_insert(0) += 1;
                }
            }
        }

        stats
    }

    /// Number of download tasks the tree would produce
    pub fn download_tasks(&self) -> usize {
        self.files_per_mirror.values().sum()
    }
}

/// Prints crawl counters to stdout in a formatted manner
pub fn print_crawl_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Raw product links: {}", stats.raw_product_links);
    println!("  Duplicate identities skipped: {}", stats.duplicates_skipped);
    println!("  Products: {}", stats.products);
    println!("  Versions: {}", stats.versions);
    println!(
        "  Files: {} ({} with mirrors)",
        stats.files, stats.files_with_mirrors
    );
    println!("  Requests sent: {}", stats.requests_sent);
    if stats.cancelled {
        println!("  Run was cancelled; results are partial");
    }
    println!();

    println!("Units by State:");
    let mut state_counts: Vec<_> = stats.units_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (state, count) in state_counts {
        println!("  {}: {}", state, count);
    }
}

/// Prints a metadata tree summary to stdout
pub fn print_statistics(stats: &MetadataStatistics) {
    println!("=== Metadata Statistics ===\n");

    println!("Overview:");
    println!("  Products: {}", stats.products);
    println!("  Versions: {}", stats.versions);
    println!("  Files: {}", stats.files);
    println!("  Files without mirrors: {}", stats.files_without_mirrors);
    println!("  Download tasks: {}", stats.download_tasks());
    println!();

    if !stats.files_per_mirror.is_empty() {
        println!("Files per Mirror:");
        for (mirror, count) in &stats.files_per_mirror {
            let percentage = if stats.files > 0 {
                (*count as f64 / stats.files as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", mirror, count, percentage);
        }
    }
}
