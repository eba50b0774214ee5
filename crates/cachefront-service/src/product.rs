use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a [`Product`] in the backing store.
pub type ProductId = u64;

/// The shape the caches hand records out in: shared, immutable.
pub type CachedProduct = Arc<Product>;

/// A product record as the backing store hands it out.
///
/// The caching layer never interprets the fields; only the id matters to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Stable numeric identity.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price in the smallest currency denomination.
    pub price_cents: u64,
}

impl Product {
    /// Creates a record.
    pub fn new(id: ProductId, name: impl Into<String>, price_cents: u64) -> Self {
        Product {
            id,
            name: name.into(),
            price_cents,
        }
    }
}
