//! Block storage for pagehnsw
//!
//! This crate implements the page layer the graph engine is written against:
//! - Page: fixed-size slotted page with a line-pointer array and a next-page link
//! - BlockStore: closure-scoped shared/exclusive page access
//! - MemoryBlockStore: pages held in memory, one `RwLock` per page
//! - FileBlockStore: single page file with per-page CRC32 and write-through commits
//!
//! # Locking
//!
//! A page lock is held only for the duration of the closure passed to
//! `read_page` / `write_page`. Callers never hold two page locks at once and
//! never call back into the store from inside a closure.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file;
pub mod memory;
pub mod page;
pub mod store;

pub use file::FileBlockStore;
pub use memory::MemoryBlockStore;
pub use page::Page;
pub use store::BlockStore;
