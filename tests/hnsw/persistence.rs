//! File-backed indexes across reopen

use crate::common::*;
use pagehnsw::{Error, FileBlockStore};
use tempfile::TempDir;

#[test]
fn file_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.pages");
    let points = random_points(60, 3, 31);
    let options = HnswOptions::new(3).with_m(6).with_ef_search(100);

    let before = {
        let store = FileBlockStore::create(&path).unwrap();
        HnswBuilder::new(&store, options.clone())
            .unwrap()
            .build(&rows(&points))
            .unwrap();
        let index = PagedIndex::open(&store, options.clone()).unwrap();
        index
            .insert(&IndexRow::vector(tid(60), vec![0.5, 0.5, 0.5]))
            .unwrap();
        store.sync().unwrap();
        index.search(&[0.5, 0.5, 0.5], 10, &[]).unwrap()
    };

    let store = FileBlockStore::open(&path).unwrap();
    let index = PagedIndex::open(&store, options).unwrap();
    let after = index.search(&[0.5, 0.5, 0.5], 10, &[]).unwrap();
    assert_eq!(after, before);
    assert_eq!(after[0].tid, tid(60));
    assert_eq!(index.elements().unwrap().len(), 61);
}

#[test]
fn reopen_with_other_dimensions_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.pages");
    {
        let store = FileBlockStore::create(&path).unwrap();
        build_into(&store, &HnswOptions::new(2));
    }
    let store = FileBlockStore::open(&path).unwrap();
    let err = PagedIndex::open(&store, HnswOptions::new(3)).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn build_refuses_non_empty_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.pages");
    let store = FileBlockStore::create(&path).unwrap();
    build_into(&store, &HnswOptions::new(2));
    assert!(HnswBuilder::new(&store, HnswOptions::new(2)).is_err());
}

fn build_into<S: BlockStore>(store: &S, options: &HnswOptions) {
    let data = rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
    HnswBuilder::new(store, options.clone())
        .unwrap()
        .build(&data)
        .unwrap();
}
