//! Bulk build
//!
//! Rows are inserted into an in-memory graph until the memory budget
//! (`maintenance_work_mem`) runs out. The graph is then flushed to pages in
//! one pass and every remaining row goes through the paged insert path.
//!
//! ## Flush
//!
//! ```text
//! 1. metadata page (page 0), no entry point yet
//! 2. element pages: each element tuple with a placeholder neighbor tuple,
//!    co-located when both fit on one page
//! 3. metadata: entry point and insert page
//! 4. neighbor tuples rewritten in place, now that every element has a
//!    location
//! ```
//!
//! Cancellation is checked once per input row, before each new element page
//! and before each neighbor tuple rewrite.

use std::mem::size_of;

use tracing::{debug, info, warn};

use pagehnsw_core::{
    neighbor_tuple_size, CancelFlag, Error, HnswOptions, IndexRow, ItemPointer, PageId, Result,
    RowRef, HNSW_MAX_SIZE, LINE_POINTER_SIZE,
};
use pagehnsw_storage::{BlockStore, Page};

use crate::backing::InMemory;
use crate::codec::{payload_len, ElementTuple, IndexMeta, NeighborTuple};
use crate::distance::DistanceEngine;
use crate::graph::{Element, ElementId, Graph, NeighborArray, NeighborEntry, Payload};
use crate::insert::{connect_back, find_duplicate, insert_element};
use crate::level::LevelGenerator;
use crate::paged::PagedIndex;

/// Counters reported at the end of a build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Rows seen, indexed or not
    pub heap_tuples: u64,
    /// Rows indexed, duplicates included
    pub index_tuples: u64,
    /// Elements written by the flush
    pub elements_flushed: u64,
    /// Indexed rows at the moment the in-memory graph stopped fitting the
    /// budget; `None` if it never did
    pub spilled_after: Option<u64>,
}

/// Mutable state of one bulk build
pub struct BuildState<'s, S: BlockStore> {
    graph: Graph,
    entry_point: Option<ElementId>,
    memory_left: i64,
    flushed: bool,
    stats: BuildStats,
    levels: LevelGenerator,
    paged: Option<PagedIndex<'s, S>>,
}

impl<'s, S: BlockStore> BuildState<'s, S> {
    /// Bytes of the budget still unused; negative once exceeded
    pub fn memory_left(&self) -> i64 {
        self.memory_left
    }

    /// Whether the in-memory graph has been written to pages
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Elements currently held in memory
    pub fn graph_len(&self) -> usize {
        self.graph.len()
    }

    /// Counters so far
    pub fn stats(&self) -> BuildStats {
        self.stats
    }
}

/// Builds an index into an empty block store
pub struct HnswBuilder<'s, S: BlockStore> {
    store: &'s S,
    options: HnswOptions,
    engine: DistanceEngine,
    cancel: CancelFlag,
}

impl<'s, S: BlockStore> HnswBuilder<'s, S> {
    /// Builder for `store`, which must not contain any page yet.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if the options are invalid
    /// - [`Error::InvalidInput`] if the store already has pages
    pub fn new(store: &'s S, options: HnswOptions) -> Result<Self> {
        options.validate()?;
        if store.page_count() != 0 {
            return Err(Error::input(format!(
                "cannot build into a store with {} pages",
                store.page_count()
            )));
        }
        Ok(HnswBuilder {
            store,
            engine: DistanceEngine::new(&options),
            options,
            cancel: CancelFlag::new(),
        })
    }

    /// Poll `cancel` during the build
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fresh build state with the full memory budget
    pub fn start(&self) -> BuildState<'s, S> {
        info!(
            dimensions = self.options.dimensions,
            m = self.options.m,
            ef_construction = self.options.ef_construction,
            metric = self.options.metric.name(),
            budget = self.options.maintenance_work_mem,
            "building hnsw index"
        );
        BuildState {
            graph: Graph::new(),
            entry_point: None,
            memory_left: self.options.maintenance_work_mem as i64,
            flushed: false,
            stats: BuildStats::default(),
            levels: LevelGenerator::new(&self.options),
            paged: None,
        }
    }

    /// Feed one row.
    ///
    /// # Errors
    ///
    /// Row errors ([`Error::DimensionMismatch`], [`Error::InvalidInput`],
    /// [`Error::ElementTooLarge`]), [`Error::Cancelled`], and storage errors.
    pub fn add_row(&self, state: &mut BuildState<'s, S>, row: &IndexRow) -> Result<()> {
        self.cancel.check()?;
        state.stats.heap_tuples += 1;

        let payload = match Payload::from_row(row, &self.options)? {
            Some(p) => p,
            None => return Ok(()),
        };

        if !state.flushed && state.memory_left <= 0 {
            warn!(
                tuples = state.stats.index_tuples,
                "hnsw graph no longer fits into maintenance_work_mem after {} tuples; \
                 building will take significantly more time",
                state.stats.index_tuples
            );
            state.stats.spilled_after = Some(state.stats.index_tuples);
            self.flush(state)?;
        }

        if let Some(paged) = &state.paged {
            paged.insert_payload(row.tid, payload)?;
        } else {
            self.insert_in_memory(state, row.tid, payload)?;
        }

        state.stats.index_tuples += 1;
        Ok(())
    }

    fn insert_in_memory(
        &self,
        state: &mut BuildState<'s, S>,
        tid: RowRef,
        payload: Payload,
    ) -> Result<()> {
        let m = self.options.m;
        let level = state.levels.next_level();
        let size = payload_len(&payload);

        let graph = &mut state.graph;
        let backing = InMemory::new(&self.engine);
        let id = graph.push(Element::new(level, tid, payload, m));

        insert_element(
            graph,
            &backing,
            id,
            state.entry_point,
            self.options.ef_construction,
            m,
            false,
        )?;

        if let Some(dup) = find_duplicate(graph, id, self.options.is_multi_column()) {
            graph.get_mut(dup).heaptids.push(tid);
            graph.discard_last(id);
            state.memory_left -= size_of::<RowRef>() as i64;
            return Ok(());
        }

        connect_back(graph, &backing, id, m)?;

        let replaces_entry = match state.entry_point {
            Some(ep) => level > graph.get(ep).level,
            None => true,
        };
        if replaces_entry {
            state.entry_point = Some(id);
        }

        state.memory_left -= element_memory(level, m, size) as i64;
        Ok(())
    }

    /// Flush if still in memory and report the counters
    pub fn finish(&self, mut state: BuildState<'s, S>) -> Result<BuildStats> {
        if !state.flushed {
            self.flush(&mut state)?;
        }
        self.store.sync()?;
        info!(
            heap_tuples = state.stats.heap_tuples,
            index_tuples = state.stats.index_tuples,
            elements_flushed = state.stats.elements_flushed,
            spilled = state.stats.spilled_after.is_some(),
            "hnsw index built"
        );
        Ok(state.stats)
    }

    /// Build from `rows` in one call
    pub fn build<'r, I>(self, rows: I) -> Result<BuildStats>
    where
        I: IntoIterator<Item = &'r IndexRow>,
    {
        let mut state = self.start();
        for row in rows {
            self.add_row(&mut state, row)?;
        }
        self.finish(state)
    }

    // ========================================================================
    // Flush
    // ========================================================================

    fn flush(&self, state: &mut BuildState<'s, S>) -> Result<()> {
        let m = self.options.m;
        let graph = &mut state.graph;
        debug!(elements = graph.len(), "flushing hnsw graph to pages");

        let meta_page = self.store.allocate_page()?;
        if meta_page != PageId::META {
            return Err(Error::corruption(format!(
                "metadata page allocated as {}",
                meta_page
            )));
        }
        let mut meta = IndexMeta::new(
            self.options.dimensions,
            m,
            self.options.ef_construction,
        );
        let meta_bytes = meta.encode()?;
        self.store
            .write_page(meta_page, |p| p.add_item(meta_page, &meta_bytes).map(|_| ()))?;

        // element pages with placeholder neighbor tuples
        let mut pages = PageWriter::new(self.store, &self.cancel)?;
        let ids: Vec<ElementId> = graph.ids().collect();
        for &id in &ids {
            let element = graph.get(id);
            let mut etup = ElementTuple::from_element(element)?;
            let etup_size = etup.encoded_len();
            let ntup_size = neighbor_tuple_size(element.level, m);
            let combined = etup_size + ntup_size + LINE_POINTER_SIZE;
            let colocated = combined <= HNSW_MAX_SIZE;
            let level = element.level;

            if pages.free_space() < etup_size
                || (colocated && pages.free_space() < combined)
            {
                pages.append()?;
            }

            let location = ItemPointer::new(pages.current(), pages.next_slot());
            let neighbor_location = if colocated {
                ItemPointer::new(pages.current(), location.slot + 1)
            } else {
                ItemPointer::new(pages.reserve_next()?, 0)
            };
            etup.neighbor_tid = neighbor_location;

            pages.add(&etup.encode()?)?;
            if !colocated {
                pages.append()?;
            }
            pages.add(&NeighborTuple::placeholder(level, m).encode())?;

            graph.set_location(id, location);
            graph.get_mut(id).neighbor_location = Some(neighbor_location);
        }
        let insert_page = pages.finish()?;

        // entry point always replaces whatever page 0 says
        meta.entry = match state.entry_point {
            Some(ep) => {
                let e = graph.get(ep);
                e.location.map(|loc| (loc, e.level))
            }
            None => None,
        };
        meta.insert_page = insert_page;
        let meta_bytes = meta.encode()?;
        self.store
            .write_page(meta_page, |p| p.overwrite_item(0, &meta_bytes))?;

        // neighbor tuples
        for &id in &ids {
            self.cancel.check()?;
            let element = graph.get(id);
            let nloc = element
                .neighbor_location
                .ok_or_else(|| Error::corruption("flushed element has no neighbor tuple"))?;
            let bytes = NeighborTuple::from_element(graph, element, m)?.encode();
            self.store
                .write_page(nloc.page, |p| p.overwrite_item(nloc.slot, &bytes))?;
        }

        state.stats.elements_flushed = ids.len() as u64;
        state.flushed = true;
        state.graph = Graph::new();
        state.entry_point = None;
        state.paged = Some(PagedIndex::resume(
            self.store,
            self.options.clone(),
            state.levels.clone(),
            self.cancel.clone(),
        ));
        info!(
            elements = ids.len(),
            pages = self.store.page_count(),
            "flushed hnsw graph"
        );
        Ok(())
    }
}

/// Bytes charged against the budget for one element
fn element_memory(level: usize, m: usize, payload_len: usize) -> usize {
    size_of::<Element>()
        + size_of::<NeighborArray>() * (level + 1)
        + size_of::<NeighborEntry>() * m * (level + 2)
        + size_of::<RowRef>()
        + payload_len
}

/// Sequential page writer for the flush.
///
/// Pages are filled locally and committed whole when the writer moves on.
struct PageWriter<'a, S: BlockStore> {
    store: &'a S,
    cancel: &'a CancelFlag,
    id: PageId,
    page: Page,
    reserved: Option<PageId>,
}

impl<'a, S: BlockStore> PageWriter<'a, S> {
    fn new(store: &'a S, cancel: &'a CancelFlag) -> Result<Self> {
        cancel.check()?;
        let id = store.allocate_page()?;
        Ok(PageWriter {
            store,
            cancel,
            id,
            page: Page::new(),
            reserved: None,
        })
    }

    fn current(&self) -> PageId {
        self.id
    }

    fn free_space(&self) -> usize {
        self.page.free_space()
    }

    fn next_slot(&self) -> u16 {
        self.page.next_slot()
    }

    fn add(&mut self, item: &[u8]) -> Result<u16> {
        self.page.add_item(self.id, item)
    }

    /// Allocate the page that will follow the current one
    fn reserve_next(&mut self) -> Result<PageId> {
        match self.reserved {
            Some(id) => Ok(id),
            None => {
                let id = self.store.allocate_page()?;
                self.reserved = Some(id);
                Ok(id)
            }
        }
    }

    /// Commit the current page and continue on a new, linked one
    fn append(&mut self) -> Result<()> {
        let next = self.reserve_next()?;
        self.reserved = None;
        self.page.set_next_page(next);
        self.commit()?;
        self.cancel.check()?;
        self.id = next;
        self.page = Page::new();
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let page = std::mem::take(&mut self.page);
        self.store.write_page(self.id, move |p| {
            *p = page;
            Ok(())
        })
    }

    /// Commit the last page and return its id
    fn finish(mut self) -> Result<PageId> {
        self.commit()?;
        Ok(self.id)
    }
}
