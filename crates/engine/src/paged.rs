//! Paged index operations
//!
//! [`PagedIndex`] runs the graph algorithms directly against a block store:
//! scans, single-row inserts, element repair and tombstoning. Each operation
//! builds a fresh [`Graph`] as its cache, so nothing outlives the call but
//! the pages themselves.
//!
//! ## Page layout
//!
//! ```text
//! page 0        metadata record (item 0)
//! page 1..      element tuples, each followed by its neighbor tuple when both
//!               fit on one page; pages are linked through `next_page`
//! ```
//!
//! New elements are placed by walking the chain from the metadata's insert
//! page to the first page with room for both tuples, appending pages at the
//! tail when none has.
//!
//! ## Locking
//!
//! Every page access is one closure under the store's page lock. Neighbor
//! slots are rewritten under the neighbor page's exclusive lock after
//! re-validating the tuple; metadata changes happen under page 0's lock.

use parking_lot::Mutex;
use tracing::{debug, warn};

use pagehnsw_core::{
    layer_capacity, neighbor_slot_count, neighbor_tuple_size, CancelFlag, Error, HnswOptions,
    IndexRow, ItemPointer, PageId, Result, RowRef, HEAPTIDS, HNSW_MAX_SIZE, LINE_POINTER_SIZE,
};
use pagehnsw_storage::BlockStore;

use crate::backing::{read_element, Backing, PageBacking};
use crate::codec::{is_element_tuple, ElementTuple, IndexMeta, NeighborTuple};
use crate::distance::{normalize, DistanceEngine, Query, ScanKey};
use crate::graph::{empty_layers, Element, ElementId, Graph, NeighborEntry, Payload};
use crate::insert::{identical_neighbors, insert_element, update_connection, ConnectionUpdate};
use crate::level::LevelGenerator;
use crate::search::{descend, search_layer};

/// One row returned by a scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanItem {
    /// Row reference
    pub tid: RowRef,
    /// Distance between the row's element and the query
    pub distance: f32,
}

/// An HNSW index living in a block store
pub struct PagedIndex<'s, S: BlockStore> {
    store: &'s S,
    options: HnswOptions,
    engine: DistanceEngine,
    levels: Mutex<LevelGenerator>,
    cancel: CancelFlag,
}

impl<'s, S: BlockStore> std::fmt::Debug for PagedIndex<'s, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedIndex")
            .field("options", &self.options)
            .finish()
    }
}

impl<'s, S: BlockStore> PagedIndex<'s, S> {
    /// Open an index previously built in `store`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if `options` are invalid or disagree with
    ///   the dimension or `m` the index was built with
    /// - [`Error::Corruption`] if the metadata record is missing or damaged
    pub fn open(store: &'s S, options: HnswOptions) -> Result<Self> {
        options.validate()?;
        let meta = read_meta(store)?;
        if meta.dimensions != options.dimensions {
            return Err(Error::config(format!(
                "index has {} dimensions, options say {}",
                meta.dimensions, options.dimensions
            )));
        }
        if meta.m != options.m {
            return Err(Error::config(format!(
                "index was built with m = {}, options say {}",
                meta.m, options.m
            )));
        }
        let levels = LevelGenerator::new(&options);
        Ok(Self::resume(store, options, levels, CancelFlag::new()))
    }

    /// Continue from a bulk build that spilled to pages
    pub(crate) fn resume(
        store: &'s S,
        options: HnswOptions,
        levels: LevelGenerator,
        cancel: CancelFlag,
    ) -> Self {
        PagedIndex {
            store,
            engine: DistanceEngine::new(&options),
            options,
            levels: Mutex::new(levels),
            cancel,
        }
    }

    /// Use `cancel` for neighbor-page rewrites
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Index options
    pub fn options(&self) -> &HnswOptions {
        &self.options
    }

    /// Current metadata record
    pub fn meta(&self) -> Result<IndexMeta> {
        read_meta(self.store)
    }

    fn backing(&self) -> PageBacking<'_, S> {
        PageBacking::new(self.store, &self.engine, self.options.m)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    /// The `k` rows nearest to `query`, nearest first.
    ///
    /// Tombstoned elements are skipped. An element with several row
    /// references yields all of them at the same distance.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if the query has the wrong length
    /// - [`Error::InvalidInput`] if a key does not name an attribute column
    pub fn search(&self, query: &[f32], k: usize, keys: &[ScanKey]) -> Result<Vec<ScanItem>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.options.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.options.dimensions,
                got: query.len(),
            });
        }
        self.engine.validate_keys(keys)?;

        let vector = if self.options.metric.normalizes() {
            match normalize(query) {
                Some(v) => v,
                None => return Ok(Vec::new()),
            }
        } else {
            query.to_vec()
        };

        let (entry, entry_level) = match self.meta()?.entry {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };

        let backing = self.backing();
        let mut graph = Graph::new();
        let q = Query::Keys {
            vector: &vector,
            keys,
        };

        let entry_id = graph.intern(entry);
        let ep = vec![backing.entry_candidate(&mut graph, entry_id, &q)?];
        let ep = descend(&mut graph, &backing, &q, ep, entry_level, 0, None)?;
        let ef = self.options.ef_search.max(k);
        let w = search_layer(&mut graph, &backing, &q, ep, ef, 0, None)?;

        let mut items = Vec::with_capacity(k.min(w.len() * HEAPTIDS));
        for c in w.iter().rev() {
            let element = graph.get(c.id);
            if element.is_tombstoned() {
                continue;
            }
            for tid in &element.heaptids {
                items.push(ScanItem {
                    tid: *tid,
                    distance: c.distance,
                });
            }
            if items.len() >= k {
                break;
            }
        }
        items.truncate(k);

        debug!(k, ef, visited = graph.len(), returned = items.len(), "hnsw scan");
        Ok(items)
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert one row.
    ///
    /// Returns `false` if the row is not indexed (NULL vector, or a zero
    /// vector under the cosine metric).
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] / [`Error::InvalidInput`] for bad rows
    /// - [`Error::ElementTooLarge`] if the element cannot fit on a page
    /// - [`Error::Cancelled`] if cancelled while rewriting neighbors
    pub fn insert(&self, row: &IndexRow) -> Result<bool> {
        match Payload::from_row(row, &self.options)? {
            Some(payload) => {
                self.insert_payload(row.tid, payload)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn insert_payload(&self, tid: RowRef, payload: Payload) -> Result<()> {
        let m = self.options.m;
        let meta = self.meta()?;
        let level = self.levels.lock().next_level();

        let backing = self.backing();
        let mut graph = Graph::new();
        let id = graph.push(Element::new(level, tid, payload, m));

        let entry = match meta.entry {
            Some((loc, _)) => {
                let e = graph.intern(loc);
                backing.load_element(&mut graph, e)?;
                Some(e)
            }
            None => None,
        };

        insert_element(
            &mut graph,
            &backing,
            id,
            entry,
            self.options.ef_construction,
            m,
            false,
        )?;

        for dup in identical_neighbors(&graph, id, self.options.is_multi_column()) {
            if let Some(location) = graph.get(dup).location {
                if self.add_heaptid(location, tid)? {
                    debug!(%location, "folded duplicate row into existing element");
                    return Ok(());
                }
            }
        }

        let (location, insert_page) = self.write_new_element(&mut graph, id, meta.insert_page)?;
        if let Some(page) = insert_page {
            self.update_meta(|meta| meta.insert_page = page)?;
        }

        self.update_neighbor_pages(&mut graph, &backing, id, false)?;

        let replaces_entry = match meta.entry {
            Some((_, entry_level)) => level > entry_level,
            None => true,
        };
        if replaces_entry {
            self.update_meta(|meta| {
                let greater = meta.entry.map(|(_, l)| level > l).unwrap_or(true);
                if greater {
                    meta.entry = Some((location, level));
                }
            })?;
        }
        Ok(())
    }

    /// Append `tid` to the element at `location` if it has room and is live
    fn add_heaptid(&self, location: ItemPointer, tid: RowRef) -> Result<bool> {
        self.store.write_page(location.page, |page| {
            let bytes = page
                .item(location.slot)
                .ok_or_else(|| Error::corruption(format!("no element tuple at {}", location)))?;
            let mut etup = ElementTuple::decode(bytes)?;
            if etup.deleted || etup.heaptids.is_empty() || etup.heaptids.len() >= HEAPTIDS {
                return Ok(false);
            }
            etup.heaptids.push(tid);
            page.overwrite_item(location.slot, &etup.encode()?)?;
            Ok(true)
        })
    }

    /// Place a new element and its neighbor tuple.
    ///
    /// Returns the element's location and, when it moved, the new insert page.
    fn write_new_element(
        &self,
        graph: &mut Graph,
        id: ElementId,
        insert_page: PageId,
    ) -> Result<(ItemPointer, Option<PageId>)> {
        let m = self.options.m;
        let element = graph.get(id);
        let mut etup = ElementTuple::from_element(element)?;
        let ntup = NeighborTuple::from_element(graph, element, m)?.encode();

        let etup_size = etup.encoded_len();
        let combined = etup_size + ntup.len() + LINE_POINTER_SIZE;
        let min_combined = etup_size + neighbor_tuple_size(0, m) + LINE_POINTER_SIZE;
        let colocated = combined <= HNSW_MAX_SIZE;

        if !insert_page.is_valid() {
            return Err(Error::corruption("index has no insert page"));
        }

        let mut page_id = insert_page;
        let mut first_with_room: Option<PageId> = None;

        let location = loop {
            let (free, next) = self
                .store
                .read_page(page_id, |p| (p.free_space(), p.next_page()))?;

            if first_with_room.is_none() && free >= min_combined {
                first_with_room = Some(page_id);
            }

            if colocated && free >= combined {
                if let Some(loc) = self.place_colocated(page_id, &mut etup, &ntup, combined)? {
                    break loc;
                }
                // lost a race for the space; look again
                continue;
            }

            if next.is_valid() {
                page_id = next;
                continue;
            }

            // tail of the chain; a split element first tries to keep its
            // element tuple here and only appends the neighbor page
            if !colocated && free >= etup_size {
                let neighbor_page = self.store.allocate_page()?;
                etup.neighbor_tid = ItemPointer::new(neighbor_page, 0);
                let bytes = etup.encode()?;
                let slot = self.store.write_page(page_id, |p| {
                    if p.free_space() < bytes.len() {
                        return Ok(None);
                    }
                    p.add_item(page_id, &bytes).map(Some)
                })?;
                self.append_to_chain(page_id, neighbor_page)?;
                if first_with_room.is_none() {
                    first_with_room = Some(neighbor_page);
                }
                match slot {
                    Some(slot) => {
                        self.place_neighbor_tuple(neighbor_page, &ntup)?;
                        break ItemPointer::new(page_id, slot);
                    }
                    None => {
                        // lost the space; the empty neighbor page is the new tail
                        page_id = neighbor_page;
                        continue;
                    }
                }
            }

            let new_page = self.store.allocate_page()?;
            self.append_to_chain(page_id, new_page)?;
            if first_with_room.is_none() {
                first_with_room = Some(new_page);
            }

            if colocated {
                if let Some(loc) = self.place_colocated(new_page, &mut etup, &ntup, combined)? {
                    break loc;
                }
                page_id = new_page;
                continue;
            }

            let neighbor_page = self.store.allocate_page()?;
            self.append_to_chain(new_page, neighbor_page)?;
            etup.neighbor_tid = ItemPointer::new(neighbor_page, 0);
            let bytes = etup.encode()?;
            let slot = self
                .store
                .write_page(new_page, |p| p.add_item(new_page, &bytes))?;
            self.place_neighbor_tuple(neighbor_page, &ntup)?;
            break ItemPointer::new(new_page, slot);
        };

        graph.set_location(id, location);
        graph.get_mut(id).neighbor_location = Some(etup.neighbor_tid);

        let moved = first_with_room.filter(|p| *p != insert_page);
        Ok((location, moved))
    }

    /// Put both tuples on `page_id` if they still fit
    fn place_colocated(
        &self,
        page_id: PageId,
        etup: &mut ElementTuple,
        ntup: &[u8],
        combined: usize,
    ) -> Result<Option<ItemPointer>> {
        self.store.write_page(page_id, |p| {
            if p.free_space() < combined {
                return Ok(None);
            }
            let slot = p.next_slot();
            etup.neighbor_tid = ItemPointer::new(page_id, slot + 1);
            p.add_item(page_id, &etup.encode()?)?;
            p.add_item(page_id, ntup)?;
            Ok(Some(ItemPointer::new(page_id, slot)))
        })
    }

    /// Write a split element's neighbor tuple to slot 0 of its own page
    fn place_neighbor_tuple(&self, page_id: PageId, ntup: &[u8]) -> Result<()> {
        let slot = self
            .store
            .write_page(page_id, |p| p.add_item(page_id, ntup))?;
        if slot != 0 {
            return Err(Error::corruption(format!(
                "neighbor tuple landed in slot {} of fresh page {}",
                slot, page_id
            )));
        }
        Ok(())
    }

    /// Link `new_page` after the current tail of the chain containing `from`
    fn append_to_chain(&self, from: PageId, new_page: PageId) -> Result<()> {
        let mut page_id = from;
        loop {
            let linked = self.store.write_page(page_id, |p| {
                let next = p.next_page();
                if next.is_valid() {
                    return Ok(Some(next));
                }
                p.set_next_page(new_page);
                Ok(None)
            })?;
            match linked {
                Some(next) => page_id = next,
                None => return Ok(()),
            }
        }
    }

    /// Point the neighbors of `id` back at it, one neighbor tuple at a time
    fn update_neighbor_pages(
        &self,
        graph: &mut Graph,
        backing: &PageBacking<'_, S>,
        id: ElementId,
        check_existing: bool,
    ) -> Result<()> {
        let m = self.options.m;
        let location = graph
            .get(id)
            .location
            .ok_or_else(|| Error::corruption("element has no location"))?;
        let level = graph.get(id).level;

        for lc in (0..=level).rev() {
            let lm = layer_capacity(m, lc);
            let neighbors: Vec<NeighborEntry> = match graph.get(id).layer(lc) {
                Some(array) => array.items.clone(),
                None => continue,
            };

            for hc in neighbors {
                self.cancel.check()?;

                // latest neighbors; they may have changed since the search
                backing.reload_neighbors(graph, hc.id)?;
                if graph.get(hc.id).layer(lc).is_none() {
                    continue;
                }

                let distance = hc.distance.unwrap_or(f32::INFINITY);
                let update = update_connection(graph, backing, id, distance, hc.id, lm, lc)?;
                let replaced = match update {
                    ConnectionUpdate::Unchanged => continue,
                    ConnectionUpdate::Appended => None,
                    ConnectionUpdate::Replaced(i) => Some(i),
                };

                let neighbor = graph.get(hc.id);
                let n_level = neighbor.level;
                let nloc = match neighbor.neighbor_location {
                    Some(loc) => loc,
                    None => {
                        warn!(neighbor = ?neighbor.location, "neighbor has no neighbor tuple");
                        continue;
                    }
                };

                self.store.write_page(nloc.page, |p| {
                    let mut tuple = match p.item(nloc.slot).and_then(NeighborTuple::decode) {
                        Some(t) if t.slots.len() == neighbor_slot_count(n_level, m) => t,
                        _ => return Ok(()),
                    };
                    let start = NeighborTuple::layer_start(n_level, lc, m);
                    let region = start..(start + lm).min(tuple.slots.len());

                    if check_existing && tuple.slots[region.clone()].contains(&location) {
                        return Ok(());
                    }
                    let idx = match replaced {
                        None => region.clone().find(|&j| !tuple.slots[j].is_valid()),
                        Some(i) => Some(start + i),
                    };
                    if let Some(j) = idx {
                        if j < tuple.slots.len() {
                            tuple.slots[j] = location;
                            p.overwrite_item(nloc.slot, &tuple.encode())?;
                        }
                    }
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Recompute the neighbors of the element at `location` and reconnect
    /// them, skipping the element itself as a candidate.
    ///
    /// The entry point is left alone.
    pub fn repair(&self, location: ItemPointer) -> Result<()> {
        let m = self.options.m;
        let (entry, _) = match self.meta()?.entry {
            Some(entry) => entry,
            None => return Ok(()),
        };
        if entry == location {
            return Ok(());
        }

        let backing = self.backing();
        let mut graph = Graph::new();
        let id = graph.intern(location);
        backing.load_element(&mut graph, id)?;
        let level = graph.get(id).level;
        graph.get_mut(id).neighbors = Some(empty_layers(level, m));

        let entry_id = graph.intern(entry);
        insert_element(
            &mut graph,
            &backing,
            id,
            Some(entry_id),
            self.options.ef_construction,
            m,
            true,
        )?;

        let nloc = graph
            .get(id)
            .neighbor_location
            .ok_or_else(|| Error::corruption(format!("element at {} has no neighbor tuple", location)))?;
        let bytes = NeighborTuple::from_element(&graph, graph.get(id), m)?.encode();
        self.store
            .write_page(nloc.page, |p| p.overwrite_item(nloc.slot, &bytes))?;

        self.update_neighbor_pages(&mut graph, &backing, id, true)?;
        debug!(%location, "repaired element");
        Ok(())
    }

    /// Mark the element at `location` deleted and drop its row references.
    ///
    /// The element keeps routing searches but is never returned or selected
    /// as a neighbor again.
    pub fn tombstone(&self, location: ItemPointer) -> Result<()> {
        self.store.write_page(location.page, |page| {
            let bytes = page
                .item(location.slot)
                .ok_or_else(|| Error::corruption(format!("no element tuple at {}", location)))?;
            let mut etup = ElementTuple::decode(bytes)?;
            etup.deleted = true;
            etup.heaptids.clear();
            page.overwrite_item(location.slot, &etup.encode()?)
        })
    }

    /// Element at `location`
    pub fn element(&self, location: ItemPointer) -> Result<ElementTuple> {
        read_element(self.store, location)
    }

    /// Every element tuple in page order
    pub fn elements(&self) -> Result<Vec<(ItemPointer, ElementTuple)>> {
        let mut out = Vec::new();
        for n in 1..self.store.page_count() {
            let page_id = PageId::new(n);
            let found = self.store.read_page(page_id, |p| {
                let mut found = Vec::new();
                for slot in 0..p.item_count() {
                    if let Some(bytes) = p.item(slot) {
                        if is_element_tuple(bytes) {
                            found.push((ItemPointer::new(page_id, slot), ElementTuple::decode(bytes)));
                        }
                    }
                }
                found
            })?;
            for (loc, etup) in found {
                out.push((loc, etup?));
            }
        }
        Ok(out)
    }

    /// Location of the live element holding row `tid`
    pub fn locate(&self, tid: RowRef) -> Result<Option<ItemPointer>> {
        Ok(self
            .elements()?
            .into_iter()
            .find(|(_, etup)| !etup.deleted && etup.heaptids.contains(&tid))
            .map(|(loc, _)| loc))
    }

    fn update_meta(&self, f: impl FnOnce(&mut IndexMeta)) -> Result<()> {
        self.store.write_page(PageId::META, |page| {
            let bytes = page
                .item(0)
                .ok_or_else(|| Error::corruption("missing metadata record"))?;
            let mut meta = IndexMeta::decode(bytes)?;
            f(&mut meta);
            page.overwrite_item(0, &meta.encode()?)
        })
    }
}

/// Read the metadata record from page 0
pub fn read_meta<S: BlockStore>(store: &S) -> Result<IndexMeta> {
    if store.page_count() == 0 {
        return Err(Error::corruption("index has no metadata page"));
    }
    store
        .read_page(PageId::META, |page| page.item(0).map(IndexMeta::decode))?
        .unwrap_or_else(|| Err(Error::corruption("missing metadata record")))
}
