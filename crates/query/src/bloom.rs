//! Bloom filter used for semi-join pruning.
//!
//! A filter is loaded with the keys of one side of a semi-join and bound
//! into a `QueryBindings` slot; the other side probes it before doing any
//! storage access. False positives are possible, false negatives are not.

use core::hash::BuildHasher;
use hashbrown::hash_map::DefaultHashBuilder;
use keel_core::Value;

/// Fixed-size probabilistic set of value tuples.
#[derive(Clone, Debug)]
pub struct BloomFilter {
    bits: Vec<u64>,
    n_bits: u64,
    n_hashes: u32,
    hasher: DefaultHashBuilder,
}

impl BloomFilter {
    /// Sizes a filter for `expected_entries` keys at roughly `error_rate`
    /// false positive probability.
    pub fn new(expected_entries: usize, error_rate: f64) -> Self {
        let n = expected_entries.max(1) as f64;
        let p = error_rate.clamp(1e-9, 0.5);
        let ln2 = core::f64::consts::LN_2;
        let n_bits = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let n_hashes = ((n_bits as f64 / n) * ln2).round().clamp(1.0, 16.0) as u32;
        let words = n_bits.div_ceil(64) as usize;
        Self {
            bits: vec![0; words],
            n_bits,
            n_hashes,
            hasher: DefaultHashBuilder::default(),
        }
    }

    /// Returns the number of bits in the filter.
    pub fn n_bits(&self) -> u64 {
        self.n_bits
    }

    /// Returns the number of hash probes per key.
    pub fn n_hashes(&self) -> u32 {
        self.n_hashes
    }

    fn probes(&self, key: &[Value]) -> impl Iterator<Item = u64> {
        let hash = self.hasher.hash_one(key);
        let h1 = hash & 0xffff_ffff;
        let h2 = (hash >> 32) | 1;
        let n_bits = self.n_bits;
        (0..self.n_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % n_bits)
    }

    /// Adds a key.
    pub fn add(&mut self, key: &[Value]) {
        let probes: Vec<u64> = self.probes(key).collect();
        for bit in probes {
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// Returns false only if `key` was certainly never added.
    pub fn maybe_contains(&self, key: &[Value]) -> bool {
        self.probes(key)
            .all(|bit| self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
    }
}
