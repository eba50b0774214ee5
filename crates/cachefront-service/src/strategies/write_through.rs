use std::sync::Arc;

use cachefront_cache::{CacheError, LoadingCache};

use crate::config::CacheConfig;
use crate::product::{Product, ProductId};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::SharedProductStore;

use super::{CachedProduct, into_product, store_loader};

/// Read-through reads with write-through writes.
///
/// A successful store write is mirrored into the cache before the write call
/// returns, so a read immediately after a write never misses. A failed store
/// write leaves the cache untouched; the cache never shows a value that was
/// not durably stored.
pub struct WriteThroughCache {
    store: SharedProductStore,
    cache: LoadingCache<ProductId, CachedProduct>,
    stats: CacheStats,
}

impl std::fmt::Debug for WriteThroughCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteThroughCache")
            .field("cache", &self.cache)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl WriteThroughCache {
    /// Creates the façade on top of `store`.
    pub fn new(store: SharedProductStore, config: &CacheConfig) -> Self {
        WriteThroughCache {
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

    /// Creates or updates a record in the store and the cache together.
    pub async fn create_or_update(&self, product: Product) -> Result<Product, CacheError> {
        let saved = self.store.save(product).await?;
        self.cache.put(saved.id, Arc::new(saved.clone()));
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
    use crate::testing::MockProductStore;

    use super::*;

    fn setup() -> (Arc<MockProductStore>, WriteThroughCache) {
        let store = Arc::new(MockProductStore::new());
        let facade =
            WriteThroughCache::new(Arc::clone(&store) as SharedProductStore, &CacheConfig::default());
        (store, facade)
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_after_write_never_misses() {
        let (store, facade) = setup();

        facade
            .create_or_update(Product::new(1, "webcam", 8999))
            .await
            .unwrap();

        let cached = facade.get_product(1).await.unwrap().unwrap();
        assert_eq!(cached.price_cents, 8999);
        assert_eq!(store.load_calls(), 0);

        let stats = facade.stats();
        assert_eq!((stats.requests, stats.hits, stats.misses), (1, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_is_visible_without_reload() {
        let (store, facade) = setup();

        facade
            .create_or_update(Product::new(1, "webcam", 8999))
            .await
            .unwrap();
        facade
            .create_or_update(Product::new(1, "webcam", 7999))
            .await
            .unwrap();

        let cached = facade.get_product(1).await.unwrap().unwrap();
        assert_eq!(cached.price_cents, 7999);
        assert_eq!(store.load_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_leaves_cache_untouched() {
        let (store, facade) = setup();
        store.insert(Product::new(1, "webcam", 8999));

        store.fail_saves(true);
        let err = facade
            .create_or_update(Product::new(1, "webcam", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Store(_)));

        // the cache holds nothing for the key; the read sees the stored value
        let cached = facade.get_product(1).await.unwrap().unwrap();
        assert_eq!(cached.price_cents, 8999);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_never_serves_stale() {
        let (_store, facade) = setup();

        facade
            .create_or_update(Product::new(2, "stand", 2999))
            .await
            .unwrap();
        facade.delete(2).await.unwrap();
        assert_eq!(facade.get_product(2).await.unwrap(), None);
    }
}
