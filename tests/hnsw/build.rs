//! Bulk build: duplicate folding, memory budget, determinism, cancellation

use crate::common::*;
use pagehnsw::{CancelFlag, DistanceMetric, Error};

#[test]
fn small_build_folds_duplicates_and_finds_nearest() {
    let options = HnswOptions::new(2).with_m(2);
    let data = rows(&[
        vec![0.0, 0.0],
        vec![0.0, 0.0],
        vec![10.0, 10.0],
        vec![1.0, 1.0],
    ]);
    let store = MemoryBlockStore::new();
    let stats = HnswBuilder::new(&store, options.clone())
        .unwrap()
        .build(&data)
        .unwrap();
    assert_eq!(stats.index_tuples, 4);
    assert_eq!(stats.elements_flushed, 3);

    let index = PagedIndex::open(&store, options).unwrap();
    let elements = index.elements().unwrap();
    assert_eq!(elements.len(), 3);
    let origin = elements
        .iter()
        .find(|(_, e)| e.payload.vector == vec![0.0, 0.0])
        .unwrap();
    assert_eq!(origin.1.heaptids.as_slice(), &[tid(0), tid(1)]);

    let nearest = index.search(&[0.0, 0.0], 1, &[]).unwrap();
    assert_eq!(tids(&nearest), vec![tid(0)]);
    assert_eq!(nearest[0].distance, 0.0);

    let all = index.search(&[0.0, 0.0], 4, &[]).unwrap();
    assert_eq!(tids(&all), vec![tid(0), tid(1), tid(3), tid(2)]);
    assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn budget_exhaustion_matches_unbudgeted_build() {
    let points = random_points(100, 4, 7);
    let data = rows(&points);
    let options = HnswOptions::new(4).with_m(8).with_ef_search(100);

    let unbudgeted = MemoryBlockStore::new();
    let full = HnswBuilder::new(&unbudgeted, options.clone())
        .unwrap()
        .build(&data)
        .unwrap();
    assert_eq!(full.spilled_after, None);
    assert_eq!(full.elements_flushed, 100);

    let budgeted = MemoryBlockStore::new();
    let small = options.clone().with_maintenance_work_mem(1024);
    let spilled = HnswBuilder::new(&budgeted, small)
        .unwrap()
        .build(&data)
        .unwrap();
    let after = spilled.spilled_after.unwrap();
    assert!(after > 0 && after < 100);
    assert_eq!(spilled.elements_flushed, after);
    assert_eq!(spilled.index_tuples, 100);

    let a = PagedIndex::open(&unbudgeted, options.clone()).unwrap();
    let b = PagedIndex::open(&budgeted, options).unwrap();
    let expected: std::collections::BTreeSet<_> = data.iter().map(|r| r.tid).collect();
    assert_eq!(indexed_tids(&a), expected);
    assert_eq!(indexed_tids(&b), expected);

    for query in random_points(5, 4, 99) {
        let exact = brute_force(&points, &query, 10);
        assert_eq!(tids(&a.search(&query, 10, &[]).unwrap()), exact);
        assert_eq!(tids(&b.search(&query, 10, &[]).unwrap()), exact);
    }
}

#[test]
fn identical_builds_produce_identical_pages() {
    let data = rows(&random_points(60, 3, 11));
    let options = HnswOptions::new(3).with_m(4).with_seed(42);
    let first = build_memory(&options, &data);
    let second = build_memory(&options, &data);
    assert_eq!(page_images(&first), page_images(&second));
}

#[test]
fn duplicates_overflow_after_ten_references() {
    let mut points = vec![vec![1.0, 1.0]; 12];
    points.push(vec![5.0, 5.0]);
    let data = rows(&points);
    let options = HnswOptions::new(2).with_m(4);
    let store = build_memory(&options, &data);

    let index = PagedIndex::open(&store, options).unwrap();
    let mut sizes: Vec<usize> = index
        .elements()
        .unwrap()
        .iter()
        .filter(|(_, e)| e.payload.vector == vec![1.0, 1.0])
        .map(|(_, e)| e.heaptids.len())
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 10]);

    let hits = index.search(&[1.0, 1.0], 12, &[]).unwrap();
    assert_eq!(hits.len(), 12);
    assert!(hits.iter().all(|h| h.distance == 0.0));
}

#[test]
fn cosine_build_skips_zero_vectors() {
    let data = rows(&[vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 2.0]]);
    let options = HnswOptions::new(2).with_metric(DistanceMetric::Cosine);
    let store = MemoryBlockStore::new();
    let stats = HnswBuilder::new(&store, options.clone())
        .unwrap()
        .build(&data)
        .unwrap();
    assert_eq!(stats.heap_tuples, 3);
    assert_eq!(stats.index_tuples, 2);

    let index = PagedIndex::open(&store, options).unwrap();
    let hits = index.search(&[3.0, 0.0], 1, &[]).unwrap();
    assert_eq!(tids(&hits), vec![tid(1)]);
}

#[test]
fn cancelled_build_returns_cancelled() {
    let data = rows(&random_points(10, 2, 3));
    let store = MemoryBlockStore::new();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = HnswBuilder::new(&store, HnswOptions::new(2))
        .unwrap()
        .with_cancel(cancel)
        .build(&data);
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn dimension_mismatch_aborts_build() {
    let data = vec![
        IndexRow::vector(tid(0), vec![1.0, 2.0]),
        IndexRow::vector(tid(1), vec![1.0, 2.0, 3.0]),
    ];
    let store = MemoryBlockStore::new();
    let result = HnswBuilder::new(&store, HnswOptions::new(2))
        .unwrap()
        .build(&data);
    assert!(matches!(
        result,
        Err(Error::DimensionMismatch {
            expected: 2,
            got: 3
        })
    ));
}
