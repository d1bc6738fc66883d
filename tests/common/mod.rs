//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub use pagehnsw::{
    BlockStore, HnswBuilder, HnswOptions, IndexRow, ItemPointer, MemoryBlockStore, PageId,
    PagedIndex, RowRef, ScanItem,
};

// ============================================================================
// Rows
// ============================================================================

/// Row reference for the `n`th input row
pub fn tid(n: u32) -> RowRef {
    ItemPointer::new(PageId::new(10_000 + n / 100), (n % 100) as u16 + 1)
}

/// One row per point, row references numbered from 0
pub fn rows(points: &[Vec<f32>]) -> Vec<IndexRow> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| IndexRow::vector(tid(i as u32), p.clone()))
        .collect()
}

/// `n` uniformly random points in `[-1, 1)^dims`
pub fn random_points(n: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

// ============================================================================
// Index helpers
// ============================================================================

/// Build `rows` into a fresh in-memory store
pub fn build_memory(options: &HnswOptions, rows: &[IndexRow]) -> MemoryBlockStore {
    let store = MemoryBlockStore::new();
    HnswBuilder::new(&store, options.clone())
        .unwrap()
        .build(rows)
        .unwrap();
    store
}

/// Row references of a scan result, in result order
pub fn tids(items: &[ScanItem]) -> Vec<RowRef> {
    items.iter().map(|i| i.tid).collect()
}

/// Every row reference held by a live element
pub fn indexed_tids<S: BlockStore>(index: &PagedIndex<'_, S>) -> BTreeSet<RowRef> {
    index
        .elements()
        .unwrap()
        .into_iter()
        .filter(|(_, e)| !e.deleted)
        .flat_map(|(_, e)| e.heaptids.into_iter())
        .collect()
}

/// Exact k nearest rows by Euclidean distance, ties by input order
pub fn brute_force(points: &[Vec<f32>], query: &[f32], k: usize) -> Vec<RowRef> {
    let mut scored: Vec<(f64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let d: f64 = p
                .iter()
                .zip(query)
                .map(|(a, b)| (*a as f64 - *b as f64).powi(2))
                .sum();
            (d, i)
        })
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, i)| tid(i as u32)).collect()
}

/// Raw bytes of every page in `store`
pub fn page_images<S: BlockStore>(store: &S) -> Vec<Vec<u8>> {
    (0..store.page_count())
        .map(|n| {
            store
                .read_page(PageId::new(n), |p| p.as_bytes().to_vec())
                .unwrap()
        })
        .collect()
}
