//! MemoryBlockStore: pages held in memory
//!
//! Each page sits behind its own `parking_lot::RwLock`, so readers and
//! writers of different pages never contend. The page table itself is
//! locked only long enough to clone the page handle.

use std::sync::Arc;

use parking_lot::RwLock;

use pagehnsw_core::{Error, PageId, Result};

use crate::page::Page;
use crate::store::BlockStore;

/// In-memory block store
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    pages: RwLock<Vec<Arc<RwLock<Page>>>>,
}

impl MemoryBlockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: PageId) -> Result<Arc<RwLock<Page>>> {
        self.pages
            .read()
            .get(id.as_u32() as usize)
            .cloned()
            .ok_or_else(|| Error::corruption(format!("page {} does not exist", id)))
    }
}

impl BlockStore for MemoryBlockStore {
    fn allocate_page(&self) -> Result<PageId> {
        let mut pages = self.pages.write();
        let id = PageId::new(pages.len() as u32);
        pages.push(Arc::new(RwLock::new(Page::new())));
        Ok(id)
    }

    fn read_page<R>(&self, id: PageId, f: impl FnOnce(&Page) -> R) -> Result<R> {
        let handle = self.handle(id)?;
        let page = handle.read();
        Ok(f(&page))
    }

    fn write_page<R>(&self, id: PageId, f: impl FnOnce(&mut Page) -> Result<R>) -> Result<R> {
        let handle = self.handle(id)?;
        let mut page = handle.write();
        let mut working = page.clone();
        let out = f(&mut working)?;
        *page = working;
        Ok(out)
    }

    fn page_count(&self) -> u32 {
        self.pages.read().len() as u32
    }
}
