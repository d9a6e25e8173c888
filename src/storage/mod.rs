//! Storage module for the harvested metadata tree
//!
//! The crawl assembles an owned tree (`Product` owns its `Version`s, each
//! `Version` owns its `FileEntry`s) and hands it once to the persistence
//! layer and to the downloader. The on-disk form is a pretty-printed JSON
//! array of products.

mod json;
mod traits;

pub use json::JsonStorage;
pub use traits::{Storage, StorageError, StorageResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An operating-system product, keyed by its canonical URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Canonical URL (unique within a run)
    pub product_url: String,

    /// Display name taken from the product page heading
    pub os_name: String,

    #[serde(default)]
    pub versions: Vec<Version>,
}

/// One release of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Absolute version-page URL (unique within its product)
    pub version_url: String,

    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// A downloadable file and its mirror locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(alias = "file_name")]
    pub name: String,

    /// Free-form size text, e.g. "1.44 MB"
    #[serde(default)]
    pub size: Option<String>,

    /// Architecture label, e.g. "x86"
    #[serde(default)]
    pub architecture: Option<String>,

    /// Mirror name -> absolute download URL
    #[serde(default)]
    pub servers: BTreeMap<String, String>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            architecture: None,
            servers: BTreeMap::new(),
        }
    }

    pub fn has_mirrors(&self) -> bool {
        !self.servers.is_empty()
    }
}

impl Product {
    /// Total number of files across all versions
    pub fn file_count(&self) -> usize {
        self.versions.iter().map(|v| v.files.len()).sum()
    }
}

/// Number of (file, mirror) pairs in a tree, i.e. the number of download tasks
pub fn mirror_link_count(products: &[Product]) -> usize {
    products
        .iter()
        .flat_map(|p| &p.versions)
        .flat_map(|v| &v.files)
        .map(|f| f.servers.len())
        .sum()
}
