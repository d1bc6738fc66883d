//! pagehnsw - on-disk HNSW approximate nearest neighbor index
//!
//! The index keeps a multi-layer proximity graph over fixed-dimension `f32`
//! vectors in fixed-size pages. It is built in bulk from a stream of rows,
//! then grows one row at a time and answers k-nearest-neighbor scans.
//!
//! # Quick Start
//!
//! ```ignore
//! use pagehnsw::{HnswBuilder, HnswOptions, IndexRow, MemoryBlockStore, PagedIndex};
//!
//! let store = MemoryBlockStore::new();
//! let options = HnswOptions::new(3).with_m(8);
//!
//! // Bulk build from the host's table scan
//! HnswBuilder::new(&store, options.clone())?.build(&rows)?;
//!
//! // Later inserts and scans go through the paged index
//! let index = PagedIndex::open(&store, options)?;
//! index.insert(&IndexRow::vector(tid, vec![1.0, 2.0, 3.0]))?;
//! let nearest = index.search(&[1.0, 2.0, 3.0], 10, &[])?;
//! ```
//!
//! # Architecture
//!
//! - `pagehnsw-core`: identifiers, rows, options, limits, errors
//! - `pagehnsw-storage`: slotted pages and block stores
//! - `pagehnsw-engine`: graph algorithms, tuple codec, build and paged index

pub use pagehnsw_core::{
    AttributeKind, AttributeWeights, CancelFlag, Datum, DistanceMetric, Error, HnswOptions,
    IndexRow, ItemPointer, PageId, Result, RowRef,
};
pub use pagehnsw_engine::{
    BuildStats, DistanceEngine, HnswBuilder, IndexMeta, PagedIndex, ScanItem, ScanKey,
};
pub use pagehnsw_storage::{BlockStore, FileBlockStore, MemoryBlockStore, Page};
