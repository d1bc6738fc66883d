//! Block store trait
//!
//! The graph engine talks to storage only through this trait. Access is
//! closure-scoped: the page lock lives exactly as long as the closure, which
//! makes it impossible to carry a lock across a graph-algorithm step.

use crate::page::Page;
use pagehnsw_core::{PageId, Result};

/// Fixed-size page storage with per-page shared/exclusive locking.
///
/// # Contract
///
/// - `allocate_page` appends an initialized empty page and returns its id.
///   Page ids are dense and increase by one per allocation.
/// - `read_page` runs `f` under the page's shared lock.
/// - `write_page` runs `f` under the page's exclusive lock on a working copy;
///   the copy replaces the page (and is made durable, for persistent stores)
///   only if `f` returns `Ok`. An `Err` leaves the page untouched.
/// - Closures must not call back into the store.
pub trait BlockStore: Send + Sync {
    /// Append a new empty page
    fn allocate_page(&self) -> Result<PageId>;

    /// Run `f` with shared access to page `id`
    fn read_page<R>(&self, id: PageId, f: impl FnOnce(&Page) -> R) -> Result<R>;

    /// Run `f` with exclusive access to page `id`, committing on success
    fn write_page<R>(&self, id: PageId, f: impl FnOnce(&mut Page) -> Result<R>) -> Result<R>;

    /// Number of allocated pages
    fn page_count(&self) -> u32;

    /// Flush committed pages to durable storage
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
