//! The read/write strategy façades exposed to callers.
//!
//! | Strategy | Read path | Write path |
//! |---|---|---|
//! | [`LookAsideCache`] | the façade consults the cache, then the store, and backfills | store write, then invalidate |
//! | [`ReadThroughCache`] | the cache's loader encapsulates the store | store write, then invalidate |
//! | [`WriteThroughCache`] | like read-through | store write and cache put together |
//!
//! All three cache a confirmed-absent record as a negative entry, so a
//! persistently missing id costs one store round trip per TTL rather than
//! one per lookup.

mod look_aside;
mod read_through;
mod write_through;

pub use look_aside::LookAsideCache;
pub use read_through::ReadThroughCache;
pub use write_through::WriteThroughCache;

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use cachefront_cache::{CacheContents, CacheError};

use crate::product::ProductId;
use crate::store::SharedProductStore;

pub(crate) use crate::product::CachedProduct;

/// Builds the canonical store-backed loader.
///
/// A missing id turns into the cacheable [`CacheError::NotFound`] sentinel.
pub(crate) fn store_loader(
    store: SharedProductStore,
) -> impl Fn(ProductId) -> BoxFuture<'static, CacheContents<CachedProduct>>
+ Clone
+ Send
+ Sync
+ 'static {
    move |id| {
        let store = Arc::clone(&store);
        async move {
            match store.load(id).await {
                Ok(Some(product)) => Ok(Arc::new(product)),
                Ok(None) => Err(CacheError::NotFound),
                Err(err) => Err(err.into()),
            }
        }
        .boxed()
    }
}

/// Maps cache contents to the caller-facing shape: a cached `NotFound` is a
/// successful "no such record" answer, not an error.
pub(crate) fn into_product(
    contents: CacheContents<CachedProduct>,
) -> Result<Option<CachedProduct>, CacheError> {
    match contents {
        Ok(product) => Ok(Some(product)),
        Err(CacheError::NotFound) => Ok(None),
        Err(err) => Err(err),
    }
}
