use std::sync::Arc;

use cachefront_cache::{CacheError, EarlyRecompute, LoadingCache};

use crate::config::CacheConfig;
use crate::product::{Product, ProductId};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::SharedProductStore;
use crate::strategies::{CachedProduct, into_product, store_loader};

/// Read-through cache with probabilistic early recomputation.
///
/// Reads may stochastically treat a still-live entry as expired and reload
/// it, weighted by the configured `beta` and by how long the entry's last
/// load took. Recomputation of a popular key thus spreads out over the time
/// leading up to its expiry instead of piling up exactly at it.
///
/// The early reload is synchronous and inline with the read that drew it
/// (the caller pays the recompute latency); it coalesces with any reload
/// already in flight for the key.
pub struct ProbabilisticCache {
    store: SharedProductStore,
    cache: LoadingCache<ProductId, CachedProduct>,
    policy: EarlyRecompute,
    stats: CacheStats,
}

impl std::fmt::Debug for ProbabilisticCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbabilisticCache")
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ProbabilisticCache {
    /// Creates the façade with an OS-seeded recompute policy.
    pub fn new(store: SharedProductStore, config: &CacheConfig) -> Self {
        Self::with_policy(store, config, EarlyRecompute::new(config.beta))
    }

    /// Creates the façade with an explicitly constructed policy, e.g. a
    /// deterministically seeded one for reproducible tests.
    pub fn with_policy(
        store: SharedProductStore,
        config: &CacheConfig,
        policy: EarlyRecompute,
    ) -> Self {
        ProbabilisticCache {
            store,
            cache: LoadingCache::new(config.max_capacity, config.ttl),
            policy,
            stats: CacheStats::default(),
        }
    }

    /// Fetches a record, possibly recomputing it ahead of its expiry.
    pub async fn get_product(&self, id: ProductId) -> Result<Option<CachedProduct>, CacheError> {
        let lookup = self
            .cache
            .get_with_early_recompute(id, &self.policy, store_loader(Arc::clone(&self.store)))
            .await;
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
