use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use cachefront_cache::CacheError;

use crate::product::{Product, ProductId};

/// An error from the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store rejected or failed the operation.
    #[error("store operation failed: {0}")]
    Operation(String),
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::Store(err.to_string())
    }
}

/// The backing key/value store the caches sit in front of.
///
/// Assumed slow: every call has non-trivial latency. Implementations must be
/// safe to call concurrently for distinct ids; nothing here assumes per-id
/// serialization.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Fetches a record, or `None` if the id does not exist.
    async fn load(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Creates or replaces a record, returning the stored version.
    async fn save(&self, product: Product) -> Result<Product, StoreError>;

    /// Deletes a record. Deleting an absent id is not an error.
    async fn delete(&self, id: ProductId) -> Result<(), StoreError>;

    /// Fetches every record, for bulk warm-up and filter rebuilds.
    async fn load_all(&self) -> Result<Vec<Product>, StoreError>;
}

/// Shared handle to a [`ProductStore`].
pub type SharedProductStore = Arc<dyn ProductStore>;
