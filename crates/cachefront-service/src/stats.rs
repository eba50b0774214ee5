use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotone lookup counters for one strategy instance.
///
/// Used for introspection only, never for control flow. Counters reset only
/// through [`CacheStats::clear`].
#[derive(Debug, Default)]
pub struct CacheStats {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Records one lookup and whether the cache answered it.
    pub fn record_lookup(&self, hit: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Resets all counters to zero.
    pub fn clear(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// A point-in-time copy of the counters.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time view of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Total lookups.
    pub requests: u64,
    /// Lookups answered from a live cache entry.
    pub hits: u64,
    /// Lookups that ran, or waited on, a load.
    pub misses: u64,
}

impl CacheStatsSnapshot {
    /// Fraction of requests answered by the cache.
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}
