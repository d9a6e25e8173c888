//! Crawler module for library page fetching and processing
//!
//! This module contains the metadata crawl, including:
//! - Paced, cancellable HTTP fetching
//! - Canonical identity resolution for product pages
//! - Link extraction for each tier of the library
//! - Download-table parsing
//! - Overall crawl coordination

mod coordinator;
mod extractor;
mod fetcher;
mod resolver;
mod table;

pub use coordinator::{run_crawl, Coordinator, CrawlOutcome, Tier, WorkLedger};
pub use extractor::{
    extract_mirror_links, extract_product_links, extract_product_name, extract_version_links,
    MirrorLink, RELEASES_LIST_SELECTOR,
};
pub use fetcher::{build_http_client, interruptible_pause, FetchError, FetchedPage, Fetcher};
pub use resolver::{
    canonical_identity, extract_canonical, CanonicalResolver, Resolution, ResolvedPage,
};
pub use table::{parse_download_table, ParsedTable, TableRow, DOWNLOADS_TABLE_SELECTOR};
