//! A fixed-size Bloom existence filter.
//!
//! Placed in front of a cache, the filter answers "definitely absent" without
//! touching the cache or the store behind it. It never produces a false
//! negative; a false positive costs one ordinary lookup. Bits are set with
//! atomic operations, so `add` and `might_contain` need no locking.

use std::f64::consts::LN_2;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHasher;

/// Seeds for the two base hashes the index family is derived from.
const SEED_LO: u64 = 0x51_7c_c1_b7_27_22_0a_95;
const SEED_HI: u64 = 0x9e_37_79_b9_7f_4a_7c_15;

/// A concurrent Bloom filter over a fixed bit array.
///
/// Append-only: there is no per-item remove. A bit, once set, is only ever
/// cleared by a full [`clear`](BloomFilter::clear) during a rebuild.
pub struct BloomFilter {
    bits: Vec<AtomicU64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates a filter with `num_bits` bits and `num_hashes` hash functions.
    ///
    /// Both are fixed for the lifetime of the filter. `num_bits` is clamped
    /// to at least one 64-bit word, `num_hashes` to at least 1.
    pub fn new(num_bits: usize, num_hashes: u32) -> Self {
        let num_bits = num_bits.max(64);
        let words = num_bits.div_ceil(64);
        BloomFilter {
            bits: (0..words).map(|_| AtomicU64::new(0)).collect(),
            num_bits: num_bits as u64,
            num_hashes: num_hashes.max(1),
        }
    }

    /// Sizes a filter for an expected number of items and a target
    /// false-positive rate.
    pub fn with_rate(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);
        let num_bits = (-(n * p.ln()) / (LN_2 * LN_2)).ceil() as usize;
        let num_hashes = ((num_bits as f64 / n) * LN_2).round().max(1.0) as u32;
        Self::new(num_bits, num_hashes)
    }

    /// The width of the bit array.
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// The number of hash functions applied per key.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Marks `key` as present by setting its bit positions.
    pub fn add<K: Hash + ?Sized>(&self, key: &K) {
        let (h1, h2) = self.base_hashes(key);
        for i in 0..self.num_hashes {
            self.set_bit(self.bit_index(h1, h2, i));
        }
    }

    /// Whether `key` might have been added.
    ///
    /// `false` is definitive; `true` may be a false positive.
    pub fn might_contain<K: Hash + ?Sized>(&self, key: &K) -> bool {
        let (h1, h2) = self.base_hashes(key);
        (0..self.num_hashes).all(|i| self.test_bit(self.bit_index(h1, h2, i)))
    }

    /// Resets every bit. Only meaningful as part of a full rebuild that
    /// re-adds all known keys afterwards.
    pub fn clear(&self) {
        for word in &self.bits {
            word.store(0, Ordering::Relaxed);
        }
    }

    fn base_hashes<K: Hash + ?Sized>(&self, key: &K) -> (u64, u64) {
        let mut lo = FxHasher::default();
        lo.write_u64(SEED_LO);
        key.hash(&mut lo);

        let mut hi = FxHasher::default();
        hi.write_u64(SEED_HI);
        key.hash(&mut hi);

        // an odd second hash keeps the derived indices from collapsing
        (lo.finish(), hi.finish() | 1)
    }

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % self.num_bits
    }

    fn set_bit(&self, index: u64) {
        let word = (index / 64) as usize;
        let mask = 1u64 << (index % 64);
        self.bits[word].fetch_or(mask, Ordering::Relaxed);
    }

    fn test_bit(&self, index: u64) -> bool {
        let word = (index / 64) as usize;
        let mask = 1u64 << (index % 64);
        self.bits[word].load(Ordering::Relaxed) & mask != 0
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .finish()
    }
}
