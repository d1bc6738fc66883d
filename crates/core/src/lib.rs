//! Core types for pagehnsw
//!
//! This crate defines the foundational types shared by the storage and
//! engine crates:
//! - PageId / ItemPointer: stable locations of tuples inside the page file
//! - Datum / IndexRow: values fed to the index by the host executor
//! - HnswOptions: index parameters, loadable from `hnsw.toml`
//! - Limits: page geometry and the size bounds derived from it
//! - CancelFlag: cooperative cancellation checkpoints
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod limits;
pub mod types;

pub use cancel::CancelFlag;
pub use config::{AttributeKind, AttributeWeights, DistanceMetric, HnswOptions, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use limits::{
    element_tuple_size, layer_capacity, max_level, neighbor_slot_count, neighbor_tuple_size,
    HEAPTIDS, HNSW_MAX_DIM, HNSW_MAX_SIZE, LINE_POINTER_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE,
};
pub use types::{Datum, IndexRow, ItemPointer, PageId, RowRef};
