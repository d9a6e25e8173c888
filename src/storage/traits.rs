//! Storage traits and error types

use crate::storage::Product;
use thiserror::Error;

/// Errors that can occur while loading or persisting metadata
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for metadata persistence backends
pub trait Storage {
    /// Loads the full product tree
    fn load(&self) -> StorageResult<Vec<Product>>;

    /// Replaces the persisted tree with `products`
    fn save(&self, products: &[Product]) -> StorageResult<()>;
}
