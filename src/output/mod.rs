//! Output module for progress reporting and run statistics
//!
//! This module handles:
//! - The crawl progress channel (status lines and two percentages)
//! - Statistics for crawl runs and persisted metadata trees

pub mod progress;
pub mod stats;

pub use progress::{percent, CrawlEvent, ProgressReporter};
pub use stats::{
    print_crawl_statistics, print_statistics, CrawlStatistics, MetadataStatistics,
};
