//! HNSW Benchmarks
//!
//! Run with: cargo bench --bench hnsw_benchmarks
//!
//! ## Benchmark Categories
//!
//! - hnsw_build: bulk build, in memory and spilled to pages
//! - hnsw_insert: single-row paged insert into a built index
//! - hnsw_search: k-NN scan for several k and ef_search values

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pagehnsw::{
    HnswBuilder, HnswOptions, IndexRow, ItemPointer, MemoryBlockStore, PageId, PagedIndex,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Constants and Utilities
// ============================================================================

/// Fixed seed for reproducible benchmarks
const BENCH_SEED: u64 = 0xDEADBEEF_CAFEBABE;

const DIMENSIONS: usize = 32;

fn random_rows(n: usize, seed: u64) -> Vec<IndexRow> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let tid = ItemPointer::new(PageId::new(1 + i as u32 / 200), (i % 200) as u16 + 1);
            let v = (0..DIMENSIONS).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
            IndexRow::vector(tid, v)
        })
        .collect()
}

fn options() -> HnswOptions {
    HnswOptions::new(DIMENSIONS).with_m(16).with_ef_construction(64)
}

// ============================================================================
// Build
// ============================================================================

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_build");
    group.sample_size(10);

    for n in [1_000usize, 5_000] {
        let rows = random_rows(n, BENCH_SEED);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("in_memory", n), &rows, |b, rows| {
            b.iter(|| {
                let store = MemoryBlockStore::new();
                HnswBuilder::new(&store, options())
                    .unwrap()
                    .build(rows)
                    .unwrap()
            })
        });

        // spill after roughly a tenth of the rows
        let budget = n * 100;
        group.bench_with_input(BenchmarkId::new("spilled", n), &rows, |b, rows| {
            b.iter(|| {
                let store = MemoryBlockStore::new();
                HnswBuilder::new(&store, options().with_maintenance_work_mem(budget))
                    .unwrap()
                    .build(rows)
                    .unwrap()
            })
        });
    }
    group.finish();
}

// ============================================================================
// Insert
// ============================================================================

fn bench_insert(c: &mut Criterion) {
    let rows = random_rows(2_000, BENCH_SEED);
    let extra = random_rows(10_000, BENCH_SEED + 1);
    let store = MemoryBlockStore::new();
    HnswBuilder::new(&store, options())
        .unwrap()
        .build(&rows)
        .unwrap();
    let index = PagedIndex::open(&store, options()).unwrap();

    let mut next = extra.iter().cycle();
    c.bench_function("hnsw_insert/paged", |b| {
        b.iter(|| {
            let row = next.next().unwrap();
            black_box(index.insert(row).unwrap())
        })
    });
}

// ============================================================================
// Search
// ============================================================================

fn bench_search(c: &mut Criterion) {
    let rows = random_rows(10_000, BENCH_SEED);
    let queries = random_rows(100, BENCH_SEED + 2);
    let mut group = c.benchmark_group("hnsw_search");

    for ef in [40usize, 200] {
        let store = MemoryBlockStore::new();
        let opts = options().with_ef_search(ef);
        HnswBuilder::new(&store, opts.clone())
            .unwrap()
            .build(&rows)
            .unwrap();
        let index = PagedIndex::open(&store, opts).unwrap();

        for k in [1usize, 10, 100] {
            let id = format!("ef={}/k={}", ef, k);
            let mut q = queries.iter().cycle();
            group.bench_function(BenchmarkId::from_parameter(id), |b| {
                b.iter(|| {
                    let query = q.next().unwrap();
                    let v = query.vector_value().unwrap();
                    black_box(index.search(v, k, &[]).unwrap())
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_insert, bench_search);
criterion_main!(benches);
