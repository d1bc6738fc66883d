//! Paged inserts, tombstones and repair after a build

use crate::common::*;

#[test]
fn inserts_after_build_are_searchable() {
    let points = random_points(30, 3, 1);
    let options = HnswOptions::new(3).with_m(4).with_ef_search(100);
    let store = build_memory(&options, &rows(&points[..10]));
    let index = PagedIndex::open(&store, options).unwrap();

    for (i, p) in points.iter().enumerate().skip(10) {
        assert!(index.insert(&IndexRow::vector(tid(i as u32), p.clone())).unwrap());
    }
    assert_eq!(index.elements().unwrap().len(), 30);

    for (i, p) in points.iter().enumerate() {
        let hits = index.search(p, 1, &[]).unwrap();
        assert_eq!(tids(&hits), vec![tid(i as u32)]);
    }
}

#[test]
fn inserts_into_empty_index_set_entry_point() {
    let options = HnswOptions::new(2);
    let store = build_memory(&options, &[]);
    let index = PagedIndex::open(&store, options).unwrap();
    assert!(index.meta().unwrap().entry.is_none());
    assert!(index.search(&[0.0, 0.0], 3, &[]).unwrap().is_empty());

    index.insert(&IndexRow::vector(tid(0), vec![2.0, 2.0])).unwrap();
    let (entry, _) = index.meta().unwrap().entry.unwrap();
    assert_eq!(index.element(entry).unwrap().heaptids.as_slice(), &[tid(0)]);
}

#[test]
fn paged_duplicates_overflow_after_ten_references() {
    let options = HnswOptions::new(2).with_m(4);
    let store = build_memory(&options, &rows(&[vec![5.0, 5.0]]));
    let index = PagedIndex::open(&store, options).unwrap();

    for i in 1..=12 {
        index.insert(&IndexRow::vector(tid(i), vec![1.0, 1.0])).unwrap();
    }

    let mut sizes: Vec<usize> = index
        .elements()
        .unwrap()
        .iter()
        .filter(|(_, e)| e.payload.vector == vec![1.0, 1.0])
        .map(|(_, e)| e.heaptids.len())
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 10]);
}

#[test]
fn tombstoned_rows_disappear_from_scans() {
    let points = random_points(40, 2, 8);
    let options = HnswOptions::new(2).with_m(4).with_ef_search(100);
    let store = build_memory(&options, &rows(&points));
    let index = PagedIndex::open(&store, options).unwrap();

    let query = points[17].clone();
    let before = index.search(&query, 1, &[]).unwrap();
    assert_eq!(tids(&before), vec![tid(17)]);

    let location = index.locate(tid(17)).unwrap().unwrap();
    index.tombstone(location).unwrap();
    assert!(index.locate(tid(17)).unwrap().is_none());
    let tuple = index.element(location).unwrap();
    assert!(tuple.deleted);
    assert!(tuple.heaptids.is_empty());

    let after = index.search(&query, 5, &[]).unwrap();
    assert!(!tids(&after).contains(&tid(17)));
    assert_eq!(after.len(), 5);
}

#[test]
fn repair_after_tombstones_keeps_index_searchable() {
    let points = random_points(40, 2, 9);
    let options = HnswOptions::new(2).with_m(4).with_ef_search(100);
    let store = build_memory(&options, &rows(&points));
    let index = PagedIndex::open(&store, options).unwrap();

    for n in [3, 4, 5] {
        let loc = index.locate(tid(n)).unwrap().unwrap();
        index.tombstone(loc).unwrap();
    }
    for n in [0, 1, 2, 6] {
        let loc = index.locate(tid(n)).unwrap().unwrap();
        let level = index.element(loc).unwrap().level;
        index.repair(loc).unwrap();
        assert_eq!(index.element(loc).unwrap().level, level);
    }

    let live: Vec<usize> = (0..40).filter(|i| ![3, 4, 5].contains(i)).collect();
    for i in live {
        let hits = index.search(&points[i], 1, &[]).unwrap();
        assert_eq!(tids(&hits), vec![tid(i as u32)]);
    }
}
