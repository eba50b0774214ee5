use std::sync::Arc;

use cachefront_cache::{CacheError, LoadingCache, Refresher};

use crate::config::CacheConfig;
use crate::product::{Product, ProductId};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::SharedProductStore;
use crate::strategies::{CachedProduct, into_product, store_loader};

/// Read-through cache whose hot keys are reloaded ahead of expiry.
///
/// Keys marked hot via [`add_hot_key`](Self::add_hot_key) are refreshed by a
/// background task every `refresh_interval`, strictly before their TTL runs
/// out. Readers of a hot key therefore never observe a miss caused by
/// natural expiry, which is what removes the stampede risk for that key;
/// cold keys still rely on the cache's load coalescing.
pub struct EarlyRefreshCache {
    store: SharedProductStore,
    cache: LoadingCache<ProductId, CachedProduct>,
    refresher: Refresher<ProductId>,
    stats: CacheStats,
}

impl std::fmt::Debug for EarlyRefreshCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarlyRefreshCache")
            .field("cache", &self.cache)
            .field("refresher", &self.refresher)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl EarlyRefreshCache {
    /// Creates the façade and spawns its refresh task.
    ///
    /// Must be called within a Tokio runtime. The task stops when the façade
    /// is dropped.
    pub fn new(store: SharedProductStore, config: &CacheConfig) -> Self {
        let cache = LoadingCache::new(config.max_capacity, config.ttl);
        let refresher = Refresher::spawn(
            cache.clone(),
            config.refresh_interval,
            store_loader(Arc::clone(&store)),
        );
        EarlyRefreshCache {
            store,
            cache,
            refresher,
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
    ///
    /// A deleted id that is still marked hot turns into a negative entry on
    /// the next refresh tick; untrack it when it is gone for good.
    pub async fn delete(&self, id: ProductId) -> Result<(), CacheError> {
        self.cache.invalidate(&id);
        self.store.delete(id).await?;
        Ok(())
    }

    /// Starts early-refreshing `id`. Returns `false` if it already was hot.
    pub fn add_hot_key(&self, id: ProductId) -> bool {
        self.refresher.add_hot_key(id)
    }

    /// Stops early-refreshing `id`. Returns `false` if it was not hot.
    pub fn remove_hot_key(&self, id: ProductId) -> bool {
        self.refresher.remove_hot_key(&id)
    }

    /// Whether `id` is currently early-refreshed.
    pub fn is_hot(&self, id: ProductId) -> bool {
        self.refresher.is_hot(&id)
    }

    /// Synchronously loads every record the store knows into the cache,
    /// resetting all their expiries.
    ///
    /// This is the manual bulk warm-up, independent of the hot-key set and
    /// the timer. Returns the number of records loaded.
    pub async fn refresh_all(&self) -> Result<usize, CacheError> {
        let products = self.store.load_all().await.map_err(CacheError::from)?;
        let count = products.len();
        for product in products {
            self.cache.put(product.id, Arc::new(product));
        }
        tracing::debug!(count, "bulk-refreshed all records");
        Ok(count)
    }

    /// A snapshot of the lookup counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drops every cache entry and resets the counters. Hot keys stay
    /// tracked and repopulate on the next tick.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.stats.clear();
    }
}
