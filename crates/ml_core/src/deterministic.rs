//! Deterministic utilities for reproducible splits and training
//!
//! Provides an LCG-based RNG and the tie-breaking key used when two tree
//! splits have the same gain, so identical seeds give identical results on
//! every platform.

use std::num::Wrapping;

/// Linear Congruential Generator for seeded pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<u64>,
}

impl LcgRng {
    const MULTIPLIER: u64 = 1103515245;
    const INCREMENT: u64 = 12345;
    const MODULUS: u64 = 1 << 31;

    pub fn new(seed: u64) -> Self {
        Self {
            state: Wrapping(seed),
        }
    }

    /// Derive an independent stream, e.g. one per tree in a forest
    pub fn derive(seed: u64, stream: u64) -> Self {
        Self::new(seed.wrapping_mul(0x9E37_79B9).wrapping_add(stream.wrapping_mul(7919)))
    }

    /// Next value in range [0, MODULUS)
    ///
    /// The state advances modulo 2^64; only the high 31 bits are returned
    /// since the low bits of a power-of-two LCG cycle quickly.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        self.state.0 >> 33
    }

    /// Next value in range [0, max)
    pub fn next_below(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as usize
    }

    /// Next value in [0.0, 1.0)
    pub fn next_unit(&mut self) -> f64 {
        self.next_u64() as f64 / Self::MODULUS as f64
    }

    /// Fisher–Yates shuffle in place
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_below(i + 1);
            items.swap(i, j);
        }
    }

    /// `count` distinct indices drawn from [0, n), returned sorted
    pub fn sample_indices(&mut self, n: usize, count: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        self.shuffle(&mut indices);
        indices.truncate(count.min(n));
        indices.sort_unstable();
        indices
    }
}

/// Deterministic tie-breaker for split selection within one node
/// Orders by (feature_idx, threshold rank); lower wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold_rank: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold_rank: usize) -> Self {
        Self {
            feature_idx,
            threshold_rank,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        for _ in 0..100 {
            assert!(rng.next_below(10) < 10);
            let unit = rng.next_unit();
            assert!((0.0..1.0).contains(&unit));
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = LcgRng::new(7);
        let mut items: Vec<usize> = (0..50).collect();
        rng.shuffle(&mut items);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(items, sorted);
    }

    #[test]
    fn test_derived_streams_differ() {
        let mut a = LcgRng::derive(42, 0);
        let mut b = LcgRng::derive(42, 1);
        let xs: Vec<u64> = (0..5).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..5).map(|_| b.next_u64()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn test_sample_indices() {
        let mut rng = LcgRng::new(3);
        let picked = rng.sample_indices(10, 4);
        assert_eq!(picked.len(), 4);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert!(picked.iter().all(|&i| i < 10));
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 100);
        let t2 = SplitTieBreaker::new(0, 101);
        let t3 = SplitTieBreaker::new(1, 50);

        assert!(t1 < t2);
        assert!(t1 < t3);
    }
}
