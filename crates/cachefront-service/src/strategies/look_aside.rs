use std::sync::Arc;

use cachefront_cache::{CacheError, LoadingCache};

use crate::config::CacheConfig;
use crate::product::{Product, ProductId};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::SharedProductStore;

use super::{CachedProduct, into_product, store_loader};

/// Look-aside reads with write-around writes.
///
/// The façade itself orchestrates the read path: it consults the cache
/// first and only goes to the store on a miss, backfilling through the
/// coalesced load so racing readers of a cold key share one store call.
/// Writes go to the store and drop the cached key; the next read refills it.
pub struct LookAsideCache {
    store: SharedProductStore,
    cache: LoadingCache<ProductId, CachedProduct>,
    stats: CacheStats,
}

impl std::fmt::Debug for LookAsideCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookAsideCache")
            .field("cache", &self.cache)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl LookAsideCache {
    /// Creates the façade on top of `store`.
    pub fn new(store: SharedProductStore, config: &CacheConfig) -> Self {
        LookAsideCache {
            store,
            cache: LoadingCache::new(config.max_capacity, config.ttl),
            stats: CacheStats::default(),
        }
    }

    /// Fetches a record, preferring the cache.
    pub async fn get_product(&self, id: ProductId) -> Result<Option<CachedProduct>, CacheError> {
        if let Some(contents) = self.cache.get_if_present(&id) {
            self.stats.record_lookup(true);
            return into_product(contents);
        }
        self.stats.record_lookup(false);
        let lookup = self.cache.get_with(id, store_loader(Arc::clone(&self.store))).await;
        into_product(lookup.into_contents())
    }

    /// Creates or updates a record in the store and drops the cached key.
    pub async fn create_or_update(&self, product: Product) -> Result<Product, CacheError> {
        let saved = self.store.save(product).await?;
        self.cache.invalidate(&saved.id);
        Ok(saved)
    }

    /// Deletes a record.
    ///
    /// The cached key is dropped before the store delete, so a stale value
    /// is never served after this call returns.
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

    fn setup() -> (Arc<MockProductStore>, LookAsideCache) {
        let store = Arc::new(MockProductStore::with_products([Product::new(
            1, "keyboard", 4999,
        )]));
        let facade = LookAsideCache::new(Arc::clone(&store) as SharedProductStore, &CacheConfig::default());
        (store, facade)
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_around_forces_reload() {
        let (store, facade) = setup();

        let first = facade.get_product(1).await.unwrap().unwrap();
        assert_eq!(first.price_cents, 4999);
        assert_eq!(store.load_calls(), 1);

        // served from cache now
        facade.get_product(1).await.unwrap();
        assert_eq!(store.load_calls(), 1);

        facade
            .create_or_update(Product::new(1, "keyboard", 5999))
            .await
            .unwrap();

        // the write invalidated, so this read goes back to the store
        let second = facade.get_product(1).await.unwrap().unwrap();
        assert_eq!(second.price_cents, 5999);
        assert_eq!(store.load_calls(), 2);

        let stats = facade.stats();
        assert_eq!((stats.requests, stats.hits, stats.misses), (3, 1, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_id_is_negatively_cached() {
        let (store, facade) = setup();

        assert_eq!(facade.get_product(99).await.unwrap(), None);
        assert_eq!(store.load_calls(), 1);

        // the confirmed absence is served from cache
        assert_eq!(facade.get_product(99).await.unwrap(), None);
        assert_eq!(store.load_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_never_serves_stale() {
        let (store, facade) = setup();

        facade.get_product(1).await.unwrap().unwrap();
        facade.delete(1).await.unwrap();
        assert_eq!(store.delete_calls(), 1);

        assert_eq!(facade.get_product(1).await.unwrap(), None);
        assert_eq!(store.load_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_resets() {
        let (store, facade) = setup();

        facade.get_product(1).await.unwrap();
        facade.clear_cache();

        assert_eq!(facade.stats().requests, 0);
        facade.get_product(1).await.unwrap();
        assert_eq!(store.load_calls(), 2);
    }
}
