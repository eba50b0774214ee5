//! Probabilistic early recomputation ("xfetch").
//!
//! Instead of letting every caller observe a key expire at the same instant,
//! an entry is stochastically treated as already expired slightly ahead of
//! its TTL. The probability grows towards the expiry instant and is weighted
//! by how long the last load took, so expensive recomputations spread out
//! over time rather than piling up exactly at `expires_at`.

use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::loading::{LoadingCache, Lookup};
use crate::time::{Duration, Instant};
use crate::CacheContents;

/// Lower bound for the uniform draw, keeping `ln(r)` finite.
const MIN_DRAW: f64 = 1e-10;

/// The early-recomputation policy: an aggressiveness factor plus the random
/// source feeding its draws.
///
/// A larger `beta`, or a more expensive previous load, makes recomputing
/// ahead of expiry proportionally more likely.
pub struct EarlyRecompute {
    beta: f64,
    rng: Mutex<StdRng>,
}

impl EarlyRecompute {
    /// Creates a policy with the given aggressiveness, seeded from the OS.
    pub fn new(beta: f64) -> Self {
        Self::with_rng(beta, StdRng::from_os_rng())
    }

    /// Creates a deterministically seeded policy, for reproducible decisions.
    pub fn seeded(beta: f64, seed: u64) -> Self {
        Self::with_rng(beta, StdRng::seed_from_u64(seed))
    }

    fn with_rng(beta: f64, rng: StdRng) -> Self {
        EarlyRecompute {
            beta,
            rng: Mutex::new(rng),
        }
    }

    /// The aggressiveness factor.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// The xfetch decision for a given uniform draw `r` in `[0, 1)`:
    ///
    /// ```text
    /// now - load_latency * beta * ln(r) >= expires_at
    /// ```
    ///
    /// An entry at or past its expiry always recomputes, regardless of the
    /// draw. The draw is clamped away from zero so `ln(r)` stays finite.
    pub fn decide(
        &self,
        load_latency: Duration,
        expires_at: Instant,
        now: Instant,
        draw: f64,
    ) -> bool {
        let Some(remaining) = expires_at.checked_duration_since(now) else {
            return true;
        };
        let r = draw.max(MIN_DRAW);
        let advance = load_latency.as_secs_f64() * self.beta * -r.ln();
        advance >= remaining.as_secs_f64()
    }

    pub(crate) fn should_recompute(
        &self,
        load_latency: Duration,
        expires_at: Instant,
        now: Instant,
    ) -> bool {
        let draw = self.rng.lock().unwrap().random::<f64>();
        self.decide(load_latency, expires_at, now, draw)
    }
}

impl std::fmt::Debug for EarlyRecompute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarlyRecompute")
            .field("beta", &self.beta)
            .finish()
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Looks up `key`, with `policy` deciding whether a still-live entry is
    /// treated as expired anyway.
    ///
    /// An absent or naturally expired entry loads like [`get_with`]; hard
    /// expiry always wins. When the policy fires, the reload is synchronous
    /// and inline with this call (the caller pays the recompute latency) and
    /// coalesces with any reload already in flight for the key.
    ///
    /// [`get_with`]: LoadingCache::get_with
    pub async fn get_with_early_recompute<F, Fut>(
        &self,
        key: K,
        policy: &EarlyRecompute,
        loader: F,
    ) -> Lookup<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = CacheContents<V>> + Send + 'static,
    {
        let now = Instant::now();
        if let Some(slot) = self.slot(&key) {
            if !policy.should_recompute(slot.load_latency, slot.expires_at, now) {
                return Lookup::cached(slot.contents);
            }
        }
        self.refresh(key, loader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_always_recomputes() {
        let policy = EarlyRecompute::seeded(1.0, 0);
        let now = Instant::now();
        let expires_at = now - Duration::from_secs(1);
        assert!(policy.decide(Duration::from_millis(5), expires_at, now, 0.999));

        // and at exactly the expiry instant
        assert!(policy.decide(Duration::ZERO, now, now, 0.999));
    }

    #[test]
    fn test_draw_of_one_respects_ttl() {
        // ln(1) == 0, so nothing ever recomputes early
        let policy = EarlyRecompute::seeded(4.0, 0);
        let now = Instant::now();
        let expires_at = now + Duration::from_millis(1);
        assert!(!policy.decide(Duration::from_secs(100), expires_at, now, 1.0));
    }

    #[test]
    fn test_zero_draw_stays_finite() {
        let policy = EarlyRecompute::seeded(1.0, 0);
        let now = Instant::now();

        // -ln(MIN_DRAW) is about 23, so a 1s-costly load recomputes up to
        // roughly 23s early, but no earlier
        let soon = now + Duration::from_secs(10);
        let late = now + Duration::from_secs(60);
        assert!(policy.decide(Duration::from_secs(1), soon, now, 0.0));
        assert!(!policy.decide(Duration::from_secs(1), late, now, 0.0));
    }

    #[test]
    fn test_free_load_never_recomputes_early() {
        let policy = EarlyRecompute::seeded(8.0, 0);
        let now = Instant::now();
        let expires_at = now + Duration::from_millis(1);
        assert!(!policy.decide(Duration::ZERO, expires_at, now, 0.0));
    }

    #[test]
    fn test_probability_monotone_in_beta() {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(2);
        let load_latency = Duration::from_secs(1);

        let mut rng = StdRng::seed_from_u64(42);
        let draws: Vec<f64> = (0..5000).map(|_| rng.random()).collect();

        let recompute_count = |beta: f64| {
            let policy = EarlyRecompute::seeded(beta, 0);
            draws
                .iter()
                .filter(|&&draw| policy.decide(load_latency, expires_at, now, draw))
                .count()
        };

        let low = recompute_count(0.5);
        let mid = recompute_count(1.0);
        let high = recompute_count(2.0);

        assert!(low > 0, "even a conservative beta fires occasionally");
        assert!(low < mid && mid < high, "({low}, {mid}, {high})");
        assert!(high < draws.len(), "an aggressive beta is not a constant reload");
    }
}
