//! Level assignment
//!
//! Levels follow the usual HNSW geometric distribution,
//! `floor(-ln(U) * ml)` with `ml = 1 / ln(m)`, drawn from a SplitMix64
//! stream over a fixed seed and a monotonic counter. Identical insert
//! sequences with the same seed produce identical levels, and therefore
//! identical graphs.

use pagehnsw_core::HnswOptions;

/// Deterministic level source for one index
#[derive(Debug, Clone)]
pub struct LevelGenerator {
    seed: u64,
    counter: u64,
    ml: f64,
    max_level: usize,
}

impl LevelGenerator {
    /// Generator seeded from the index options
    pub fn new(options: &HnswOptions) -> Self {
        LevelGenerator {
            seed: options.seed,
            counter: 0,
            ml: options.ml(),
            max_level: options.max_level(),
        }
    }

    /// Number of levels drawn so far
    pub fn drawn(&self) -> u64 {
        self.counter
    }

    /// Draw the level of the next new element, capped at the highest level
    /// whose neighbor tuple fits on a page
    pub fn next_level(&mut self) -> usize {
        self.counter += 1;
        let hash = splitmix64(self.seed.wrapping_add(self.counter));

        let uniform = (hash as f64) / (u64::MAX as f64);
        // log(0)
        let uniform = uniform.max(1e-15);
        let level = (-uniform.ln() * self.ml) as usize;
        level.min(self.max_level)
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}
