//! Scans: ordering, k bounds, attribute keys

use std::collections::BTreeSet;

use crate::common::*;
use pagehnsw::{AttributeKind, Datum, Error, ScanKey};

#[test]
fn results_are_sorted_and_bounded_by_k() {
    let points = random_points(50, 3, 5);
    let options = HnswOptions::new(3).with_m(6);
    let store = build_memory(&options, &rows(&points));
    let index = PagedIndex::open(&store, options).unwrap();

    for k in [1, 5, 20, 50, 80] {
        let hits = index.search(&[0.1, 0.2, 0.3], k, &[]).unwrap();
        assert!(hits.len() <= k);
        assert!(hits.len() <= 50);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
    assert!(index.search(&[0.1, 0.2, 0.3], 0, &[]).unwrap().is_empty());
}

#[test]
fn wide_beam_is_exact_on_small_sets() {
    let points = random_points(80, 2, 21);
    let options = HnswOptions::new(2).with_m(8).with_ef_search(200);
    let store = build_memory(&options, &rows(&points));
    let index = PagedIndex::open(&store, options).unwrap();

    for query in random_points(10, 2, 22) {
        let hits = index.search(&query, 5, &[]).unwrap();
        assert_eq!(tids(&hits), brute_force(&points, &query, 5));
    }
}

#[test]
fn recall_grows_with_ef_search() {
    let points = random_points(300, 4, 77);
    let queries = random_points(25, 4, 78);
    let build = HnswOptions::new(4).with_m(8);
    let store = build_memory(&build, &rows(&points));

    let mut recalls = Vec::new();
    for ef in [10, 40, 200] {
        let index = PagedIndex::open(&store, build.clone().with_ef_search(ef)).unwrap();
        let mut found = 0;
        for q in &queries {
            let exact: BTreeSet<RowRef> = brute_force(&points, q, 10).into_iter().collect();
            let hits = index.search(q, 10, &[]).unwrap();
            found += hits.iter().filter(|h| exact.contains(&h.tid)).count();
        }
        recalls.push(found as f64 / (queries.len() * 10) as f64);
    }

    assert!(recalls.windows(2).all(|w| w[0] <= w[1]), "recall {:?}", recalls);
    assert_eq!(recalls[2], 1.0, "recall {:?}", recalls);
}

#[test]
fn attribute_keys_rank_matching_rows_first() {
    let options = HnswOptions::new(2).with_attributes(vec![AttributeKind::Int]);
    let data: Vec<IndexRow> = (0..10)
        .map(|i| {
            IndexRow::with_attributes(
                tid(i),
                vec![i as f32 * 0.1, 0.0],
                vec![Some(Datum::Int((i % 2) as i64))],
            )
        })
        .collect();
    let store = build_memory(&options, &data);
    let index = PagedIndex::open(&store, options).unwrap();

    let keys = [ScanKey::new(2, Some(Datum::Int(1)))];
    let hits = index.search(&[0.0, 0.0], 5, &keys).unwrap();
    assert_eq!(tids(&hits), vec![tid(1), tid(3), tid(5), tid(7), tid(9)]);

    // without keys only the vector counts
    let hits = index.search(&[0.0, 0.0], 2, &[]).unwrap();
    assert_eq!(tids(&hits), vec![tid(0), tid(1)]);
}

#[test]
fn bad_scan_input_is_rejected() {
    let options = HnswOptions::new(2).with_attributes(vec![AttributeKind::Text]);
    let data = vec![IndexRow::with_attributes(
        tid(0),
        vec![1.0, 1.0],
        vec![Some(Datum::Text("a".into()))],
    )];
    let store = build_memory(&options, &data);
    let index = PagedIndex::open(&store, options).unwrap();

    assert!(matches!(
        index.search(&[1.0], 1, &[]),
        Err(Error::DimensionMismatch { .. })
    ));
    let vector_key = [ScanKey::new(1, None)];
    assert!(matches!(
        index.search(&[1.0, 1.0], 1, &vector_key),
        Err(Error::InvalidInput(_))
    ));
    let missing_column = [ScanKey::new(3, None)];
    assert!(index.search(&[1.0, 1.0], 1, &missing_column).is_err());
}
