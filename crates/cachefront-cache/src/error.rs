use thiserror::Error;

/// An error that happens while loading a value into the cache.
///
/// This error enum is intended for sharing between all callers coalesced onto
/// the same load, which is why it is [`Clone`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The key does not exist in the backing store.
    ///
    /// Unlike the other variants this is a confirmed, cacheable answer: the
    /// cache keeps it as a negative entry for a full TTL so a persistently
    /// absent key does not hit the store on every lookup.
    #[error("not found")]
    NotFound,
    /// The backing store failed to answer.
    ///
    /// The attached string contains the store's error. This variant is never
    /// written to the cache, so the next lookup retries cleanly.
    #[error("backing store failed: {0}")]
    Store(String),
}

impl CacheError {
    /// Whether a load ending in this error leaves a (negative) cache entry behind.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }
}

/// Shorthand for a [`Result`] with a [`CacheError`].
pub type CacheContents<T> = Result<T, CacheError>;
