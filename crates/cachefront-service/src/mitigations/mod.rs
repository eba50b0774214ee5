//! Stampede and penetration mitigations layered on the same cache primitive.
//!
//! Three independent approaches, each demonstrated by its own façade:
//!
//! - [`EarlyRefreshCache`] keeps a tracked set of hot keys from ever
//!   expiring naturally, by reloading them on a timer ahead of their TTL.
//! - [`ProbabilisticCache`] spreads recomputation of popular keys over time
//!   by stochastically treating entries as expired slightly early.
//! - [`BloomGatedCache`] blocks lookups for ids that never existed before
//!   they reach the cache or the store.
//!
//! The first two are alternative answers to synchronized mass expiry and are
//! not combined with each other; all three share the coalescing
//! [`LoadingCache`](cachefront_cache::LoadingCache) underneath.

mod bloom_gate;
mod early_refresh;
mod probabilistic;

pub use bloom_gate::BloomGatedCache;
pub use early_refresh::EarlyRefreshCache;
pub use probabilistic::ProbabilisticCache;
