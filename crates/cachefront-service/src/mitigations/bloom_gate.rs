use std::sync::Arc;

use cachefront_cache::{BloomFilter, CacheError, LoadingCache};

use crate::config::CacheConfig;
use crate::product::{Product, ProductId};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::SharedProductStore;
use crate::strategies::{CachedProduct, into_product, store_loader};

/// Read-through cache gated by a Bloom existence filter.
///
/// Every read consults the filter first: a definitive "absent" answer is
/// returned immediately, with no cache or store access, which blocks
/// penetration by ids that never existed. Ids are added to the filter on
/// every successful create.
///
/// The filter has no removal: deleting a record leaves its bits set, so
/// lookups of a deleted id keep passing the gate and cost one store round
/// trip per cache TTL (answered by the negative entry in between) until the
/// filter is rebuilt. That is a documented, degraded-but-correct limitation,
/// not a bug.
pub struct BloomGatedCache {
    store: SharedProductStore,
    cache: LoadingCache<ProductId, CachedProduct>,
    filter: BloomFilter,
    stats: CacheStats,
}

impl std::fmt::Debug for BloomGatedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomGatedCache")
            .field("cache", &self.cache)
            .field("filter", &self.filter)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl BloomGatedCache {
    /// Creates the façade and seeds the filter with every id the store
    /// currently knows.
    pub async fn new(store: SharedProductStore, config: &CacheConfig) -> Result<Self, CacheError> {
        let facade = BloomGatedCache {
            cache: LoadingCache::new(config.max_capacity, config.ttl),
            filter: BloomFilter::new(config.bloom_bits, config.bloom_hashes),
            store,
            stats: CacheStats::default(),
        };
        facade.rebuild_filter().await?;
        Ok(facade)
    }

    /// Fetches a record unless the filter rules its id out.
    ///
    /// A filter rejection counts as a request and a miss in the statistics;
    /// the cache never saw the lookup. A false positive costs one regular
    /// (cached) store lookup and is indistinguishable from a genuine miss to
    /// the caller.
    pub async fn get_product(&self, id: ProductId) -> Result<Option<CachedProduct>, CacheError> {
        if !self.filter.might_contain(&id) {
            self.stats.record_lookup(false);
            tracing::trace!(id, "lookup blocked by existence filter");
            return Ok(None);
        }
        let lookup = self.cache.get_with(id, store_loader(Arc::clone(&self.store))).await;
        self.stats.record_lookup(!lookup.is_fresh());
        into_product(lookup.into_contents())
    }

    /// Creates or updates a record, marks its id in the filter, and drops
    /// the cached key (write-around).
    pub async fn create_or_update(&self, product: Product) -> Result<Product, CacheError> {
        let saved = self.store.save(product).await?;
        self.filter.add(&saved.id);
        self.cache.invalidate(&saved.id);
        Ok(saved)
    }

    /// Deletes a record and drops its cache entry.
    ///
    /// The filter bits for the id stay set; see the type-level docs for the
    /// resulting degraded lookup behavior.
    pub async fn delete(&self, id: ProductId) -> Result<(), CacheError> {
        self.cache.invalidate(&id);
        self.store.delete(id).await?;
        Ok(())
    }

    /// Rebuilds the filter from scratch out of every id the store knows.
    ///
    /// This is the only way to forget deleted ids, intended for test reset
    /// and operational recovery. Reads racing the rebuild can miss ids whose
    /// bits have not been re-added yet, so run it while the façade is
    /// otherwise quiescent. Returns the number of ids added.
    pub async fn rebuild_filter(&self) -> Result<usize, CacheError> {
        let products = self.store.load_all().await.map_err(CacheError::from)?;
        self.filter.clear();
        for product in &products {
            self.filter.add(&product.id);
        }
        tracing::debug!(count = products.len(), "rebuilt existence filter");
        Ok(products.len())
    }

    /// A snapshot of the lookup counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drops every cache entry and resets the counters. The filter is left
    /// as is; use [`rebuild_filter`](Self::rebuild_filter) for a full reset.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.stats.clear();
    }
}
