//! Crawler coordinator - main crawl orchestration logic
//!
//! This module sequences the crawl across the library's four tiers:
//! 1. Fetch the index page and collect raw product links
//! 2. Resolve each raw link to its canonical identity, skipping duplicates
//! 3. Extract each unique product's version links
//! 4. Parse each version's download table and visit every file's download
//!    page to collect its mirror links
//!
//! Everything runs on one task with one request in flight. The cancellation
//! token is checked at the top of every loop iteration on every tier; when it
//! fires the run stops without error and keeps what it has assembled.

use crate::config::{Config, MirrorDirectory};
use crate::crawler::extractor::{
    extract_mirror_links, extract_product_links, extract_product_name, extract_version_links,
};
use crate::crawler::fetcher::{build_http_client, Fetcher};
use crate::crawler::resolver::{CanonicalResolver, Resolution, ResolvedPage};
use crate::crawler::table::{parse_download_table, TableRow};
use crate::output::{percent, CrawlEvent, CrawlStatistics, ProgressReporter};
use crate::state::PageState;
use crate::storage::{FileEntry, Product, Version};
use crate::{HarvestError, Result};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Page tiers of the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Index,
    ProductLink,
    Product,
    Version,
    DownloadPage,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Index => "index",
            Self::ProductLink => "product-link",
            Self::Product => "product",
            Self::Version => "version",
            Self::DownloadPage => "download-page",
        };
        write!(f, "{}", name)
    }
}

/// Tracks the state of every unit of work in a run
#[derive(Debug, Default)]
pub struct WorkLedger {
    states: HashMap<(Tier, String), PageState>,
}

impl WorkLedger {
    /// Records a unit as `Discovered` (no-op if it is already tracked)
    pub fn discover(&mut self, tier: Tier, url: &str) {
        self.states
            .entry((tier, url.to_string()))
            .or_insert(PageState::Discovered);
    }

    /// Moves a unit to `next`, rejecting illegal transitions
    ///
    /// Returns the new state on success.
    pub fn transition(
        &mut self,
        tier: Tier,
        url: &str,
        next: PageState,
    ) -> Result<PageState> {
        let key = (tier, url.to_string());
        let current = *self.states.get(&key).unwrap_or(&PageState::Discovered);

        if !current.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                url: url.to_string(),
                from: current,
                to: next,
            });
        }

        self.states.insert(key, next);
        Ok(next)
    }

    pub fn state(&self, tier: Tier, url: &str) -> Option<PageState> {
        self.states.get(&(tier, url.to_string())).copied()
    }

    /// Number of tracked units per state
    pub fn counts(&self) -> HashMap<PageState, u64> {
        let mut counts = HashMap::new();
        for state in self.states.values() {
            *counts.entry(*state).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Result of a crawl run
#[derive(Debug)]
pub struct CrawlOutcome {
    /// The assembled metadata tree (partial if cancelled)
    pub products: Vec<Product>,

    pub statistics: CrawlStatistics,

    pub cancelled: bool,
}

/// Whether a loop should keep going after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    site_base: Url,
    library_url: Url,
    product_prefix: String,
    fetcher: Fetcher,
    resolver: CanonicalResolver,
    mirrors: MirrorDirectory,
    cancel: CancellationToken,
    progress: ProgressReporter,
    ledger: WorkLedger,
    stats: CrawlStatistics,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `mirrors` - Mirror identifier table
    /// * `cancel` - Cooperative stop signal
    /// * `events` - Optional progress channel
    pub fn new(
        config: &Config,
        mirrors: MirrorDirectory,
        cancel: CancellationToken,
        events: Option<UnboundedSender<CrawlEvent>>,
    ) -> Result<Self> {
        let site_base = Url::parse(&config.site.base_url)?;
        let library_url = config.site.library_url()?;

        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.crawler.request_timeout_secs),
        )?;
        let fetcher = Fetcher::new(
            client,
            config.crawler.request_delay.to_duration(),
            cancel.clone(),
        );

        Ok(Self {
            resolver: CanonicalResolver::new(site_base.clone()),
            site_base,
            library_url,
            product_prefix: config.site.product_prefix.clone(),
            fetcher,
            mirrors,
            cancel,
            progress: ProgressReporter::new(events),
            ledger: WorkLedger::default(),
            stats: CrawlStatistics::default(),
        })
    }

    /// Runs the crawl to completion or cancellation
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - finished or cancelled run with what was assembled
    /// * `Err(HarvestError)` - the index page itself could not be fetched
    pub async fn run(mut self) -> Result<CrawlOutcome> {
        let mut products = Vec::new();

        self.progress.status(format!(
            "Fetching library page: {}",
            self.library_url
        ));

        let unique = match self.resolve_products().await? {
            (unique, Flow::Continue) => unique,
            (_, Flow::Stop) => return Ok(self.finish(products, true)),
        };

        let total = unique.len();
        self.progress
            .status(format!("Total unique OS products to process: {}", total));

        for (index, resolved) in unique.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.progress.status("Stop requested, aborting product loop");
                self.mark(Tier::Product, &resolved.canonical, PageState::Cancelled);
                return Ok(self.finish(products, true));
            }

            let pct = percent(index, total);
            self.progress.overall(pct);
            self.progress.status(format!(
                "[{:3}%] Processing OS {}/{}: {}",
                pct,
                index + 1,
                total,
                resolved.canonical
            ));

            let (product, flow) = self.process_product(resolved).await;
            products.push(product);

            if flow == Flow::Stop {
                return Ok(self.finish(products, true));
            }

            self.progress.overall(percent(index + 1, total));
        }

        self.progress.overall(100);
        self.progress.inner(100);
        self.progress.status("Scrape complete");

        Ok(self.finish(products, false))
    }

    /// Fetches the index and resolves every raw product link
    async fn resolve_products(&mut self) -> Result<(Vec<ResolvedPage>, Flow)> {
        let library_url = self.library_url.clone();
        self.ledger.discover(Tier::Index, library_url.as_str());
        self.mark(Tier::Index, library_url.as_str(), PageState::Fetching);

        let index = match self.fetcher.fetch(&library_url).await {
            Ok(page) => page,
            Err(e) if e.is_cancelled() => {
                self.mark(Tier::Index, library_url.as_str(), PageState::Cancelled);
                return Ok((Vec::new(), Flow::Stop));
            }
            Err(e) => {
                self.mark(Tier::Index, library_url.as_str(), PageState::Skipped);
                return Err(e.into());
            }
        };
        self.mark(Tier::Index, library_url.as_str(), PageState::Resolved);

        let raw_links = extract_product_links(&index.body, &index.final_url, &self.product_prefix);
        self.mark(Tier::Index, library_url.as_str(), PageState::Expanded);
        self.stats.raw_product_links = raw_links.len() as u64;
        self.progress.status(format!(
            "Found {} raw product links (may include duplicates)",
            raw_links.len()
        ));

        let mut unique = Vec::new();

        for raw in &raw_links {
            if self.cancel.is_cancelled() {
                self.progress
                    .status("Stop requested, aborting before canonical resolution");
                self.mark(Tier::Index, library_url.as_str(), PageState::Cancelled);
                return Ok((unique, Flow::Stop));
            }

            self.ledger.discover(Tier::ProductLink, raw);
            self.mark(Tier::ProductLink, raw, PageState::Fetching);

            match self.resolver.resolve(&mut self.fetcher, raw).await {
                Resolution::New(resolved) => {
                    self.mark(Tier::ProductLink, raw, PageState::Resolved);
                    self.mark(Tier::ProductLink, raw, PageState::Done);
                    self.progress.status(format!("[canon] {}", resolved.canonical));

                    self.ledger.discover(Tier::Product, &resolved.canonical);
                    self.mark(Tier::Product, &resolved.canonical, PageState::Fetching);
                    self.mark(Tier::Product, &resolved.canonical, PageState::Resolved);
                    unique.push(resolved);
                }
                Resolution::Duplicate {
                    canonical,
                    first_seen,
                    ..
                } => {
                    self.stats.duplicates_skipped += 1;
                    self.mark(Tier::ProductLink, raw, PageState::Skipped);
                    self.progress.status(format!(
                        "Duplicate canonical skipped: {} (first seen via {})",
                        canonical, first_seen
                    ));
                }
                Resolution::Invalid { raw_link } => {
                    self.mark(Tier::ProductLink, raw, PageState::Skipped);
                    tracing::warn!("Skipping unresolvable product link '{}'", raw_link);
                }
                Resolution::Failed { raw_link, error } => {
                    self.mark(Tier::ProductLink, raw, PageState::Skipped);
                    self.progress
                        .status(format!("ERROR: Failed request {}: {}", raw_link, error));
                }
                Resolution::Cancelled { .. } => {
                    self.mark(Tier::ProductLink, raw, PageState::Cancelled);
                    self.mark(Tier::Index, library_url.as_str(), PageState::Cancelled);
                    return Ok((unique, Flow::Stop));
                }
            }
        }

        self.mark(Tier::Index, library_url.as_str(), PageState::Done);
        Ok((unique, Flow::Continue))
    }

    /// Extracts a product's versions and assembles each one
    async fn process_product(&mut self, resolved: ResolvedPage) -> (Product, Flow) {
        let canonical = resolved.canonical.clone();
        let os_name = extract_product_name(&resolved.page.body, &canonical);

        let mut product = Product {
            product_url: canonical.clone(),
            os_name,
            versions: Vec::new(),
        };

        let version_links = match extract_version_links(&resolved.page.body, &self.site_base) {
            Some(links) => links,
            None => {
                self.progress
                    .status(format!("No releasesList found for {}", canonical));
                Vec::new()
            }
        };
        self.mark(Tier::Product, &canonical, PageState::Expanded);
        self.progress.status(format!(
            "Found {} versions for {}",
            version_links.len(),
            product.os_name
        ));

        let total = version_links.len();
        self.progress.reset_inner();

        for (index, version_url) in version_links.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.mark(Tier::Product, &canonical, PageState::Cancelled);
                return (product, Flow::Stop);
            }

            let pct = percent(index, total);
            self.progress.inner(pct);
            self.progress.status(format!(
                "  [{:3}%] Version {}/{}: {}",
                pct,
                index + 1,
                total,
                version_url
            ));

            let (version, flow) = self.process_version(version_url).await;
            if let Some(version) = version {
                product.versions.push(version);
            }

            if flow == Flow::Stop {
                self.mark(Tier::Product, &canonical, PageState::Cancelled);
                return (product, Flow::Stop);
            }
        }

        self.progress.inner(100);
        self.mark(Tier::Product, &canonical, PageState::Done);
        tracing::debug!(
            "Assembled {}: {} versions, {} files",
            product.os_name,
            product.versions.len(),
            product.file_count()
        );
        (product, Flow::Continue)
    }

    /// Fetches a version page and assembles its files
    ///
    /// A failed fetch yields no version; a missing download table yields a
    /// version with no files.
    async fn process_version(&mut self, version_url: &Url) -> (Option<Version>, Flow) {
        let key = version_url.as_str();
        self.ledger.discover(Tier::Version, key);
        self.mark(Tier::Version, key, PageState::Fetching);

        let page = match self.fetcher.fetch(version_url).await {
            Ok(page) => page,
            Err(e) if e.is_cancelled() => {
                self.mark(Tier::Version, key, PageState::Cancelled);
                return (None, Flow::Stop);
            }
            Err(e) => {
                self.mark(Tier::Version, key, PageState::Skipped);
                self.progress
                    .status(format!("ERROR: Failed request {}: {}", version_url, e));
                return (None, Flow::Continue);
            }
        };
        self.mark(Tier::Version, key, PageState::Resolved);

        let mut version = Version {
            version_url: version_url.to_string(),
            files: Vec::new(),
        };

        let Some(table) = parse_download_table(&page.body, &self.site_base) else {
            self.progress
                .status(format!("  No downloadsTable found at {}", version_url));
            self.mark(Tier::Version, key, PageState::Done);
            return (Some(version), Flow::Continue);
        };
        self.mark(Tier::Version, key, PageState::Expanded);

        let total = table.rows.len();
        for (index, row) in table.rows.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.mark(Tier::Version, key, PageState::Cancelled);
                return (Some(version), Flow::Stop);
            }

            let (file, flow) = self.assemble_file(row).await;
            if let Some(file) = file {
                self.progress.status(format!(
                    "    File {}/{}: {} ({})",
                    index + 1,
                    total,
                    file.name,
                    file.size.as_deref().unwrap_or("unknown size")
                ));
                version.files.push(file);
            }

            if flow == Flow::Stop {
                self.mark(Tier::Version, key, PageState::Cancelled);
                return (Some(version), Flow::Stop);
            }
        }

        self.mark(Tier::Version, key, PageState::Done);
        (Some(version), Flow::Continue)
    }

    /// Visits a file's download page and builds its record
    ///
    /// A failed download-page fetch still yields the file, with no mirrors.
    async fn assemble_file(&mut self, row: TableRow) -> (Option<FileEntry>, Flow) {
        let key = row.download_url.to_string();
        self.ledger.discover(Tier::DownloadPage, &key);
        self.mark(Tier::DownloadPage, &key, PageState::Fetching);

        let mut file = FileEntry {
            name: row.name,
            size: row.size,
            architecture: row.architecture,
            servers: Default::default(),
        };

        let page = match self.fetcher.fetch(&row.download_url).await {
            Ok(page) => page,
            Err(e) if e.is_cancelled() => {
                self.mark(Tier::DownloadPage, &key, PageState::Cancelled);
                return (None, Flow::Stop);
            }
            Err(e) => {
                self.mark(Tier::DownloadPage, &key, PageState::Skipped);
                self.progress
                    .status(format!("ERROR: Failed request {}: {}", key, e));
                return (Some(file), Flow::Continue);
            }
        };
        self.mark(Tier::DownloadPage, &key, PageState::Resolved);

        for link in extract_mirror_links(&page.body, &self.site_base, &self.mirrors) {
            file.servers.insert(link.name, link.url);
        }

        if file.servers.is_empty() {
            tracing::debug!("No mirror links on {}", key);
        }

        self.mark(Tier::DownloadPage, &key, PageState::Done);
        (Some(file), Flow::Continue)
    }

    /// Applies a ledger transition, logging illegal ones
    fn mark(&mut self, tier: Tier, url: &str, next: PageState) {
        match self.ledger.transition(tier, url, next) {
            Ok(state) => tracing::trace!("{} {} -> {}", tier, url, state),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    fn finish(mut self, products: Vec<Product>, cancelled: bool) -> CrawlOutcome {
        let mut stats = std::mem::take(&mut self.stats);

        stats.units_by_state = self.ledger.counts();
        stats.products = products.len() as u64;
        stats.versions = products.iter().map(|p| p.versions.len() as u64).sum();
        for file in products.iter().flat_map(|p| &p.versions).flat_map(|v| &v.files) {
            stats.files += 1;
            if file.has_mirrors() {
                stats.files_with_mirrors += 1;
            }
        }
        stats.requests_sent = self.fetcher.requests_sent();
        stats.cancelled = cancelled;

        let skipped = stats.units_in(PageState::Skipped);
        if skipped > 0 {
            tracing::info!("{} units skipped (failed, invalid or duplicate)", skipped);
        }

        if cancelled {
            tracing::warn!(
                "Crawl cancelled after {} products; results are partial",
                products.len()
            );
        } else {
            tracing::info!(
                "Crawl completed: {} products, {} versions, {} files",
                stats.products,
                stats.versions,
                stats.files
            );
        }

        CrawlOutcome {
            products,
            statistics: stats,
            cancelled,
        }
    }
}

/// Runs a complete crawl
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
/// use winworld_harvester::config::{load_config, MirrorDirectory};
/// use winworld_harvester::crawler::run_crawl;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvester.toml"))?;
/// let mirrors = MirrorDirectory::from_entries(&config.mirrors);
/// let outcome = run_crawl(&config, mirrors, CancellationToken::new(), None).await?;
/// println!("{} products", outcome.products.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    mirrors: MirrorDirectory,
    cancel: CancellationToken,
    events: Option<UnboundedSender<CrawlEvent>>,
) -> Result<CrawlOutcome> {
    Coordinator::new(config, mirrors, cancel, events)?.run().await
}
