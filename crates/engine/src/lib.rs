//! HNSW graph engine for pagehnsw
//!
//! This crate implements the index on top of the block store:
//! - Graph: element arena with per-layer neighbor arrays
//! - Distance: vector metrics plus the weighted attribute term
//! - Search / Select / Insert: layer search, the closer heuristic and
//!   element insertion, shared by the in-memory and paged paths
//! - Codec: element, neighbor and metadata tuple formats
//! - Build: bulk build with a memory budget and a spill to pages
//! - PagedIndex: scans, inserts, repairs and tombstones against pages
//!
//! The graph algorithms never touch pages directly. They go through a
//! [`Backing`], which is a no-op in memory and loads tuples on demand when
//! paged.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backing;
pub mod build;
pub mod codec;
pub mod distance;
pub mod graph;
pub mod insert;
pub mod level;
pub mod paged;
pub mod search;
pub mod select;

pub use backing::{Backing, InMemory, PageBacking};
pub use build::{BuildState, BuildStats, HnswBuilder};
pub use codec::{ElementTuple, IndexMeta, NeighborTuple};
pub use distance::{DistanceEngine, Query, ScanKey};
pub use graph::{Candidate, Element, ElementId, Graph, Payload};
pub use level::LevelGenerator;
pub use paged::{read_meta, PagedIndex, ScanItem};
