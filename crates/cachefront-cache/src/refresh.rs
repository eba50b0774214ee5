//! Proactive reloading of hot keys ahead of their TTL.
//!
//! A background task ticks at an interval shorter than the cache TTL and
//! reloads every tracked key, resetting its expiry. Readers of a hot key
//! therefore never observe a miss caused by natural expiry; cold keys keep
//! relying on the cache's load coalescing for their rarer misses.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::loading::LoadingCache;
use crate::{CacheContents, CacheError};

/// A background refresher for an explicitly tracked set of hot keys.
///
/// The hot-key set is owned by this value and shared with the spawned timer
/// task; dropping the refresher stops the task. Reload failures are isolated
/// per key: a failing key is logged and skipped, the rest of the tick
/// proceeds, and the key's previous entry stays in place.
pub struct Refresher<K> {
    hot_keys: Arc<Mutex<HashSet<K>>>,
    task: JoinHandle<()>,
}

impl<K> Refresher<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Spawns the refresh task, reloading hot keys into `cache` via `loader`
    /// every `refresh_interval`.
    ///
    /// `refresh_interval` must be shorter than the cache TTL for the early
    /// refresh to have any effect, and must be non-zero.
    pub fn spawn<V, L, Fut>(
        cache: LoadingCache<K, V>,
        refresh_interval: Duration,
        loader: L,
    ) -> Self
    where
        V: Clone + Send + Sync + 'static,
        L: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheContents<V>> + Send + 'static,
    {
        let hot_keys: Arc<Mutex<HashSet<K>>> = Default::default();
        let task = tokio::spawn(refresh_loop(
            cache,
            refresh_interval,
            loader,
            Arc::clone(&hot_keys),
        ));
        Refresher { hot_keys, task }
    }

    /// Starts tracking `key`. Returns `false` if it was already tracked.
    pub fn add_hot_key(&self, key: K) -> bool {
        self.hot_keys.lock().unwrap().insert(key)
    }

    /// Stops tracking `key`. Returns `false` if it was not tracked.
    pub fn remove_hot_key(&self, key: &K) -> bool {
        self.hot_keys.lock().unwrap().remove(key)
    }

    /// Whether `key` is currently tracked.
    pub fn is_hot(&self, key: &K) -> bool {
        self.hot_keys.lock().unwrap().contains(key)
    }

    /// The number of tracked keys.
    pub fn hot_key_count(&self) -> usize {
        self.hot_keys.lock().unwrap().len()
    }

    /// Untracks all keys.
    pub fn clear_hot_keys(&self) {
        self.hot_keys.lock().unwrap().clear()
    }
}

impl<K> Drop for Refresher<K> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<K: fmt::Debug> fmt::Debug for Refresher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hot_keys = self
            .hot_keys
            .try_lock()
            .map(|keys| keys.len())
            .unwrap_or_default();
        f.debug_struct("Refresher")
            .field("hot_keys", &hot_keys)
            .finish()
    }
}

async fn refresh_loop<K, V, L, Fut>(
    cache: LoadingCache<K, V>,
    refresh_interval: Duration,
    loader: L,
    hot_keys: Arc<Mutex<HashSet<K>>>,
) where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CacheContents<V>> + Send + 'static,
{
    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick of an interval completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let keys: Vec<K> = hot_keys.lock().unwrap().iter().cloned().collect();
        if keys.is_empty() {
            continue;
        }
        tracing::trace!(keys = keys.len(), "refreshing hot keys");

        // all reloads of a tick run concurrently, so one slow key does not
        // hold up the others
        let reloads = keys.into_iter().map(|key| {
            let cache = cache.clone();
            let load = loader(key.clone());
            async move {
                let lookup = cache.refresh(key.clone(), move |_| load).await;
                match lookup.contents() {
                    Ok(_) => tracing::trace!(key = ?key, "refreshed hot key"),
                    Err(CacheError::NotFound) => {
                        tracing::debug!(key = ?key, "hot key no longer exists in the store")
                    }
                    Err(err) => {
                        tracing::warn!(key = ?key, error = %err, "failed to refresh hot key")
                    }
                }
            }
        });
        join_all(reloads).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use tokio::time::{self, Duration};

    use super::*;

    /// A loader that answers with a strictly increasing version per run.
    fn versioned_loader(
        versions: Arc<AtomicUsize>,
    ) -> impl Fn(u64) -> BoxFuture<'static, CacheContents<usize>> + Clone {
        move |_key| {
            let versions = Arc::clone(&versions);
            async move { Ok(versions.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hot_key_refreshes_before_expiry() {
        let cache = LoadingCache::new(16, Duration::from_secs(60));
        let versions = Arc::new(AtomicUsize::new(0));
        let loader = versioned_loader(Arc::clone(&versions));
        let refresher = Refresher::spawn(cache.clone(), Duration::from_secs(50), loader.clone());

        let lookup = cache.get_with(2, loader.clone()).await;
        assert_eq!(lookup.contents(), &Ok(1));
        refresher.add_hot_key(2);

        // past the refresh interval, but short of the TTL
        time::sleep(Duration::from_secs(55)).await;
        assert_eq!(cache.get_if_present(&2), Some(Ok(2)));

        // well past the original TTL the refreshed entry is still live
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.get_if_present(&2), Some(Ok(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_key_does_not_block_others() {
        let cache = LoadingCache::new(16, Duration::from_secs(60));
        let versions = Arc::new(AtomicUsize::new(0));
        let fail_key_one = Arc::new(AtomicBool::new(false));

        let loader = {
            let versions = Arc::clone(&versions);
            let fail_key_one = Arc::clone(&fail_key_one);
            move |key: u64| {
                let versions = Arc::clone(&versions);
                let fail_key_one = Arc::clone(&fail_key_one);
                async move {
                    if key == 1 && fail_key_one.load(Ordering::SeqCst) {
                        Err(CacheError::Store("store down".into()))
                    } else {
                        Ok(versions.fetch_add(1, Ordering::SeqCst) + 1)
                    }
                }
                .boxed()
            }
        };

        let refresher = Refresher::spawn(cache.clone(), Duration::from_secs(10), loader.clone());

        let one = cache.get_with(1, loader.clone()).await;
        let two = cache.get_with(2, loader.clone()).await;
        assert_eq!((one.contents(), two.contents()), (&Ok(1), &Ok(2)));
        refresher.add_hot_key(1);
        refresher.add_hot_key(2);

        fail_key_one.store(true, Ordering::SeqCst);
        time::sleep(Duration::from_secs(11)).await;

        // key 2 was refreshed, key 1 kept its previous entry
        assert_eq!(cache.get_if_present(&2), Some(Ok(3)));
        assert_eq!(cache.get_if_present(&1), Some(Ok(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_key_is_no_longer_refreshed() {
        let cache = LoadingCache::new(16, Duration::from_secs(60));
        let versions = Arc::new(AtomicUsize::new(0));
        let loader = versioned_loader(Arc::clone(&versions));
        let refresher = Refresher::spawn(cache.clone(), Duration::from_secs(10), loader.clone());

        cache.get_with(7, loader.clone()).await;
        refresher.add_hot_key(7);
        assert!(refresher.is_hot(&7));

        assert!(refresher.remove_hot_key(&7));
        assert_eq!(refresher.hot_key_count(), 0);

        time::sleep(Duration::from_secs(25)).await;
        assert_eq!(versions.load(Ordering::SeqCst), 1);
    }
}
