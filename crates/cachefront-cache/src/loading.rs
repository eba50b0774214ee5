//! A bounded, TTL'd in-memory cache that coalesces concurrent loads.
//!
//! The purpose of this cache is request coalescing: for any key, at most one
//! loader runs at a time, and every caller that arrives while it runs waits
//! for and shares its result instead of starting another one. Coalescing is
//! implemented with an explicit coordination map from key to a shared
//! in-flight future, so the guarantee does not depend on a particular cache
//! library.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lru::LruCache;

use crate::time::{Duration, Instant};
use crate::{CacheContents, CacheError};

/// A value plus the expiry bookkeeping kept alongside it.
#[derive(Clone, Debug)]
pub(crate) struct CacheSlot<V> {
    /// The cached contents, possibly a negative [`CacheError::NotFound`] entry.
    pub(crate) contents: CacheContents<V>,
    /// When this slot stops being served.
    pub(crate) expires_at: Instant,
    /// Wall-clock time the load that produced this slot took.
    pub(crate) load_latency: Duration,
}

impl<V> CacheSlot<V> {
    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A load that is currently running, shared between all callers for its key.
type InFlightLoad<V> = Shared<BoxFuture<'static, CacheContents<V>>>;

/// The result of a cached lookup.
#[derive(Debug, Clone)]
pub struct Lookup<V> {
    contents: CacheContents<V>,
    fresh: bool,
}

impl<V> Lookup<V> {
    pub(crate) fn cached(contents: CacheContents<V>) -> Self {
        Lookup {
            contents,
            fresh: false,
        }
    }

    pub(crate) fn loaded(contents: CacheContents<V>) -> Self {
        Lookup {
            contents,
            fresh: true,
        }
    }

    /// Whether this lookup ran (or waited on) a loader, as opposed to being
    /// served from a live entry.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// The cached or freshly loaded contents.
    pub fn contents(&self) -> &CacheContents<V> {
        &self.contents
    }

    /// Consumes the lookup, returning its contents.
    pub fn into_contents(self) -> CacheContents<V> {
        self.contents
    }
}

struct Inner<K, V> {
    ttl: Duration,
    entries: Mutex<LruCache<K, CacheSlot<V>>>,
    inflight: Mutex<HashMap<K, InFlightLoad<V>>>,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Commits a finished load and retires its in-flight slot.
    ///
    /// Failed loads are not written, so the next lookup retries cleanly; a
    /// confirmed [`CacheError::NotFound`] is written as a negative entry.
    fn complete_load(&self, key: &K, contents: &CacheContents<V>, load_latency: Duration) {
        let cacheable = match contents {
            Ok(_) => true,
            Err(err) => err.is_cacheable(),
        };
        if cacheable {
            let slot = CacheSlot {
                contents: contents.clone(),
                expires_at: Instant::now() + self.ttl,
                load_latency,
            };
            self.entries.lock().unwrap().put(key.clone(), slot);
        }
        self.inflight.lock().unwrap().remove(key);
    }
}

/// A bounded key/value cache with TTL expiry and load coalescing.
///
/// Values are produced by per-call loaders. For any key there is at most one
/// loader running at a time; all concurrent callers for that key share its
/// result, or its error. Capacity is bounded with least-recently-used
/// eviction, which never blocks callers and never runs a loader.
pub struct LoadingCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for LoadingCache<K, V> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        LoadingCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for LoadingCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .inner
            .entries
            .try_lock()
            .map(|entries| entries.len())
            .unwrap_or_default();
        let loads = self
            .inner
            .inflight
            .try_lock()
            .map(|inflight| inflight.len())
            .unwrap_or_default();
        f.debug_struct("LoadingCache")
            .field("entries", &entries)
            .field("in-flight loads", &loads)
            .finish()
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache holding up to `max_capacity` entries for `ttl` each.
    ///
    /// A zero capacity is clamped to 1, as it would otherwise disable the
    /// cache entirely.
    pub fn new(max_capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_capacity.max(1)).expect("capacity is at least 1");
        LoadingCache {
            inner: Arc::new(Inner {
                ttl,
                entries: Mutex::new(LruCache::new(capacity)),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Looks up `key`, running `loader` if there is no live entry for it.
    ///
    /// The load is coalesced: when a load for `key` is already in flight this
    /// call waits for it and shares its result instead of loading again.
    pub async fn get_with<F, Fut>(&self, key: K, loader: F) -> Lookup<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = CacheContents<V>> + Send + 'static,
    {
        if let Some(contents) = self.fresh_contents(&key) {
            return Lookup::cached(contents);
        }
        Lookup::loaded(self.load(key, loader).await)
    }

    /// Reloads `key` regardless of whether a live entry exists.
    ///
    /// On success the entry is replaced wholesale and its expiry reset. A
    /// load already in flight for `key` is joined rather than duplicated.
    /// A failed reload leaves the previous entry untouched.
    pub async fn refresh<F, Fut>(&self, key: K, loader: F) -> Lookup<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = CacheContents<V>> + Send + 'static,
    {
        Lookup::loaded(self.load(key, loader).await)
    }

    /// Returns the live entry for `key` without running any loader.
    ///
    /// Touches the key's recency, like a regular lookup.
    pub fn get_if_present(&self, key: &K) -> Option<CacheContents<V>> {
        self.slot(key).map(|slot| slot.contents)
    }

    /// Inserts a value directly, resetting the key's expiry.
    ///
    /// A `put` does not cancel an in-flight load for the same key: the load
    /// commits when it finishes and overwrites this value (last-writer-wins
    /// at commit time).
    pub fn put(&self, key: K, value: V) {
        let slot = CacheSlot {
            contents: Ok(value),
            expires_at: Instant::now() + self.inner.ttl,
            load_latency: Duration::ZERO,
        };
        self.inner.entries.lock().unwrap().put(key, slot);
    }

    /// Removes the entry for `key`, returning whether one was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.entries.lock().unwrap().pop(key).is_some()
    }

    /// Drops all entries. In-flight loads are unaffected and commit normally.
    pub fn clear(&self) {
        self.inner.entries.lock().unwrap().clear();
    }

    /// The number of entries currently held, including expired ones that have
    /// not been overwritten or evicted yet.
    pub fn entry_count(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().unwrap().is_empty()
    }

    /// The live slot for `key`, touching its recency.
    pub(crate) fn slot(&self, key: &K) -> Option<CacheSlot<V>> {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock().unwrap();
        match entries.get(key) {
            Some(slot) if slot.is_fresh(now) => Some(slot.clone()),
            _ => None,
        }
    }

    fn fresh_contents(&self, key: &K) -> Option<CacheContents<V>> {
        self.slot(key).map(|slot| slot.contents)
    }

    /// Joins the in-flight load for `key`, starting one if there is none.
    ///
    /// The load commits its own result, so it completes even when the caller
    /// that started it goes away; an abandoned load is picked up and driven
    /// by the next caller for the key.
    async fn load<F, Fut>(&self, key: K, loader: F) -> CacheContents<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = CacheContents<V>> + Send + 'static,
    {
        let load = {
            let mut inflight = self.inner.inflight.lock().unwrap();
            match inflight.get(&key).cloned() {
                Some(load) => load,
                None => {
                    let fut = loader(key.clone());
                    let inner = Arc::downgrade(&self.inner);
                    let load_key = key.clone();
                    let load = make_load(fut, inner, load_key).boxed().shared();
                    inflight.insert(key, load.clone());
                    load
                }
            }
        };
        load.await
    }
}

/// Runs a loader future, timing it, and commits the outcome.
async fn make_load<K, V, Fut>(
    fut: Fut,
    inner: Weak<Inner<K, V>>,
    key: K,
) -> CacheContents<V>
where
    K: Eq + Hash + Clone,
    V: Clone,
    Fut: Future<Output = CacheContents<V>>,
{
    let started = Instant::now();
    let contents = fut.await;
    let load_latency = started.elapsed();
    if let Some(inner) = inner.upgrade() {
        inner.complete_load(&key, &contents, load_latency);
    }
    contents
}
