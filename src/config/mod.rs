//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and owns the static mirror identifier table.
//!
//! # Example
//!
//! ```no_run
//! use winworld_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Request delay: {}", config.crawler.request_delay);
//! ```

mod mirrors;
mod parser;
mod types;
mod validation;

pub use mirrors::{MirrorDirectory, MirrorEntry};
pub use types::{
    Config, CrawlerConfig, DownloaderConfig, OutputConfig, RequestDelay, RotationConfig,
    SiteConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
