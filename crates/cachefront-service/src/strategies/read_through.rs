use std::sync::Arc;

use cachefront_cache::{CacheError, LoadingCache};

use crate::config::CacheConfig;
use crate::product::{Product, ProductId};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::SharedProductStore;

use super::{CachedProduct, into_product, store_loader};

/// Read-through reads with write-around writes.
///
/// Callers only ever talk to the cache; the store sits behind the cache's
/// loader. Writes go to the store and invalidate the key, so the next read
/// triggers the read-through reload.
pub struct ReadThroughCache {
    store: SharedProductStore,
    cache: LoadingCache<ProductId, CachedProduct>,
    stats: CacheStats,
}

impl std::fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("cache", &self.cache)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ReadThroughCache {
    /// Creates the façade on top of `store`.
    pub fn new(store: SharedProductStore, config: &CacheConfig) -> Self {
        ReadThroughCache {
            store,
            cache: LoadingCache::new(config.max_capacity, config.ttl),
            stats: CacheStats::default(),
        }
    }

    /// Fetches a record through the cache.
    pub async fn get_product(&self, id: ProductId) -> Result<Option<CachedProduct>, CacheError> {
        let lookup = self.cache.get_with(id, store_loader(Arc::clone(&self.store))).await;
        self.stats.record_lookup(!lookup.is_fresh());
        into_product(lookup.into_contents())
    }

    /// Creates or updates a record in the store and drops the cached key.
    pub async fn create_or_update(&self, product: Product) -> Result<Product, CacheError> {
        let saved = self.store.save(product).await?;
        self.cache.invalidate(&saved.id);
        Ok(saved)
    }

    /// Deletes a record, dropping the cached key first.
    pub async fn delete(&self, id: ProductId) -> Result<(), CacheError> {
        self.cache.invalidate(&id);
        self.store.delete(id).await?;
        Ok(())
    }

    /// A snapshot of the lookup counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drops every cache entry and resets the counters.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.stats.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::testing::MockProductStore;

    use super::*;

    fn setup() -> (Arc<MockProductStore>, ReadThroughCache) {
        let store = Arc::new(MockProductStore::with_products([Product::new(
            1, "monitor", 24999,
        )]));
        let facade =
            ReadThroughCache::new(Arc::clone(&store) as SharedProductStore, &CacheConfig::default());
        (store, facade)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_encapsulates_the_store() {
        let (store, facade) = setup();

        facade.get_product(1).await.unwrap().unwrap();
        facade.get_product(1).await.unwrap().unwrap();
        assert_eq!(store.load_calls(), 1);

        let stats = facade.stats();
        assert_eq!((stats.requests, stats.hits, stats.misses), (2, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_around_reload_on_next_read() {
        let (store, facade) = setup();

        facade.get_product(1).await.unwrap();
        facade
            .create_or_update(Product::new(1, "monitor", 19999))
            .await
            .unwrap();

        let updated = facade.get_product(1).await.unwrap().unwrap();
        assert_eq!(updated.price_cents, 19999);
        assert_eq!(store.load_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_never_serves_stale() {
        let (_store, facade) = setup();

        facade.get_product(1).await.unwrap().unwrap();
        facade.delete(1).await.unwrap();
        assert_eq!(facade.get_product(1).await.unwrap(), None);
    }
}
