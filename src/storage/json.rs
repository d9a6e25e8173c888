//! JSON file storage backend

use crate::storage::{Product, Storage, StorageError, StorageResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Persists the product tree as a pretty-printed UTF-8 JSON array
///
/// Writes go to a sibling `.tmp` file that is renamed over the target, so a
/// failed save never truncates an earlier artifact.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl Storage for JsonStorage {
    fn load(&self) -> StorageResult<Vec<Product>> {
        let content = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let products: Vec<Product> = serde_json::from_str(&content)?;
        tracing::debug!(
            "Loaded {} products from {}",
            products.len(),
            self.path.display()
        );
        Ok(products)
    }

    fn save(&self, products: &[Product]) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(products)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).map_err(|e| self.io_error(e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_all())
            .map_err(|e| self.io_error(e))?;
        fs::rename(&temp, &self.path).map_err(|e| self.io_error(e))?;

        tracing::info!(
            "Saved {} products to {}",
            products.len(),
            self.path.display()
        );
        Ok(())
    }
}
