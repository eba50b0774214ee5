//! Helpers for testing the caching layer.
//!
//! The main export is [`MockProductStore`], an in-memory stand-in for the
//! backing store with per-call latency, call counting and failure injection.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::{Product, ProductId, ProductStore, StoreError};

/// An in-memory stand-in for the backing store.
///
/// Counts every call, can simulate latency (a paused tokio clock advances
/// through it deterministically), and can be told to fail loads for
/// individual ids or to fail all saves.
#[derive(Debug, Default)]
pub struct MockProductStore {
    records: Mutex<HashMap<ProductId, Product>>,
    failing_loads: Mutex<HashSet<ProductId>>,
    fail_saves: AtomicBool,
    latency: Mutex<Duration>,
    load_calls: AtomicUsize,
    save_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    load_all_calls: AtomicUsize,
}

impl MockProductStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store primed with `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::default();
        for product in products {
            store.insert(product);
        }
        store
    }

    /// Puts a record in place without counting it as a `save` call.
    pub fn insert(&self, product: Product) {
        self.records.lock().unwrap().insert(product.id, product);
    }

    /// Makes every store call sleep this long before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Makes `load` fail for `id` until restored.
    pub fn fail_loads_for(&self, id: ProductId) {
        self.failing_loads.lock().unwrap().insert(id);
    }

    /// Lets `load` succeed again for `id`.
    pub fn restore_loads_for(&self, id: ProductId) {
        self.failing_loads.lock().unwrap().remove(&id);
    }

    /// Makes every `save` fail while set.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of `load` calls so far.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of `save` calls so far.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls so far.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of `load_all` calls so far.
    pub fn load_all_calls(&self) -> usize {
        self.load_all_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ProductStore for MockProductStore {
    async fn load(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.failing_loads.lock().unwrap().contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "injected failure for id {id}"
            )));
        }
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn save(&self, product: Product) -> Result<Product, StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Operation("injected save failure".into()));
        }
        self.records
            .lock()
            .unwrap()
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn delete(&self, id: ProductId) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.records.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Product>, StoreError> {
        self.load_all_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}
