//! Where graph elements come from
//!
//! The graph algorithms are written once and run in two modes:
//!
//! - [`InMemory`]: every element lives in the arena with its payload and
//!   neighbor arrays; loading is a no-op.
//! - [`PageBacking`]: the arena is a cache over a [`BlockStore`]. Elements
//!   are hydrated from their element tuple on first use and neighbor arrays
//!   are materialized from the neighbor tuple on demand.
//!
//! Page access is closure-scoped, so no page lock outlives a single load.

use tracing::warn;

use pagehnsw_core::{Error, ItemPointer, Result};
use pagehnsw_storage::BlockStore;

use crate::codec::{decode_neighbors, DecodedNeighbors, ElementTuple};
use crate::distance::{DistanceEngine, Query};
use crate::graph::{empty_layers, Candidate, ElementId, Graph, NeighborArray, NeighborEntry};

/// Source of element payloads and neighbor arrays
pub trait Backing {
    /// Distance engine of the index
    fn engine(&self) -> &DistanceEngine;

    /// True for the in-memory build graph
    fn in_memory(&self) -> bool;

    /// Make sure the element's payload, level and row references are loaded
    fn load_element(&self, graph: &mut Graph, id: ElementId) -> Result<()>;

    /// Make sure the element's neighbor arrays are materialized
    fn load_neighbors(&self, graph: &mut Graph, id: ElementId) -> Result<()>;

    /// Drop cached neighbor arrays and read them again
    fn reload_neighbors(&self, graph: &mut Graph, id: ElementId) -> Result<()> {
        if !self.in_memory() {
            graph.get_mut(id).neighbors = None;
        }
        self.load_neighbors(graph, id)
    }

    /// Distance from a (possibly not yet loaded) element to the query
    fn distance_to(&self, graph: &mut Graph, id: ElementId, query: &Query<'_>) -> Result<f32> {
        self.load_element(graph, id)?;
        Ok(self.engine().distance(graph.get(id).payload()?, query))
    }

    /// Entry point as a search candidate
    fn entry_candidate(
        &self,
        graph: &mut Graph,
        id: ElementId,
        query: &Query<'_>,
    ) -> Result<Candidate> {
        let distance = self.distance_to(graph, id, query)?;
        Ok(Candidate::new(id, distance))
    }
}

// ============================================================================
// In-memory graph
// ============================================================================

/// Backing for the in-memory build graph
#[derive(Debug, Clone, Copy)]
pub struct InMemory<'a> {
    engine: &'a DistanceEngine,
}

impl<'a> InMemory<'a> {
    /// In-memory backing using `engine`
    pub fn new(engine: &'a DistanceEngine) -> Self {
        InMemory { engine }
    }
}

impl Backing for InMemory<'_> {
    fn engine(&self) -> &DistanceEngine {
        self.engine
    }

    fn in_memory(&self) -> bool {
        true
    }

    fn load_element(&self, _graph: &mut Graph, _id: ElementId) -> Result<()> {
        Ok(())
    }

    fn load_neighbors(&self, _graph: &mut Graph, _id: ElementId) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Paged graph
// ============================================================================

/// Backing that hydrates elements from a block store
#[derive(Debug)]
pub struct PageBacking<'a, S: BlockStore> {
    store: &'a S,
    engine: &'a DistanceEngine,
    m: usize,
}

impl<'a, S: BlockStore> PageBacking<'a, S> {
    /// Paged backing over `store` for an index with base degree `m`
    pub fn new(store: &'a S, engine: &'a DistanceEngine, m: usize) -> Self {
        PageBacking { store, engine, m }
    }

    /// Read and decode the element tuple at `location`
    pub fn read_element(&self, location: ItemPointer) -> Result<ElementTuple> {
        read_element(self.store, location)
    }
}

/// Read and decode the element tuple at `location`.
///
/// # Errors
///
/// Returns [`Error::Corruption`] if the slot is empty or does not hold an
/// element tuple.
pub fn read_element<S: BlockStore>(store: &S, location: ItemPointer) -> Result<ElementTuple> {
    store
        .read_page(location.page, |page| {
            page.item(location.slot).map(ElementTuple::decode)
        })?
        .unwrap_or_else(|| {
            Err(Error::corruption(format!(
                "no element tuple at {}",
                location
            )))
        })
}

impl<S: BlockStore> Backing for PageBacking<'_, S> {
    fn engine(&self) -> &DistanceEngine {
        self.engine
    }

    fn in_memory(&self) -> bool {
        false
    }

    fn load_element(&self, graph: &mut Graph, id: ElementId) -> Result<()> {
        if graph.get(id).is_hydrated() {
            return Ok(());
        }
        let location = graph
            .get(id)
            .location
            .ok_or_else(|| Error::corruption("unpersisted element is not loaded"))?;
        let etup = self.read_element(location)?;

        let element = graph.get_mut(id);
        element.level = etup.level;
        element.deleted = etup.deleted;
        element.heaptids = etup.heaptids;
        element.neighbor_location = if etup.neighbor_tid.is_valid() {
            Some(etup.neighbor_tid)
        } else {
            None
        };
        element.payload = Some(etup.payload);
        Ok(())
    }

    fn load_neighbors(&self, graph: &mut Graph, id: ElementId) -> Result<()> {
        if graph.get(id).neighbors.is_some() {
            return Ok(());
        }
        self.load_element(graph, id)?;
        let level = graph.get(id).level;

        let decoded = match graph.get(id).neighbor_location {
            Some(loc) => self
                .store
                .read_page(loc.page, |page| {
                    page.item(loc.slot)
                        .map(|bytes| decode_neighbors(bytes, level, self.m))
                })?
                .unwrap_or_else(|| {
                    DecodedNeighbors::Corrupt(format!("no neighbor tuple at {}", loc))
                }),
            None => DecodedNeighbors::Corrupt("element has no neighbor tuple".to_string()),
        };

        let layers = match decoded {
            DecodedNeighbors::Layers(layers) => layers,
            DecodedNeighbors::Corrupt(reason) => {
                warn!(
                    element = %graph.get(id).location.unwrap_or(ItemPointer::INVALID),
                    %reason,
                    "ignoring corrupt neighbor tuple"
                );
                graph.get_mut(id).neighbors = Some(empty_layers(level, self.m));
                return Ok(());
            }
        };

        let mut arrays = empty_layers(level, self.m);
        for (lc, locations) in layers.into_iter().enumerate() {
            let array: &mut NeighborArray = &mut arrays[lc];
            for loc in locations {
                let neighbor = graph.intern(loc);
                array.items.push(NeighborEntry {
                    id: neighbor,
                    distance: None,
                    closer: false,
                });
            }
        }
        graph.get_mut(id).neighbors = Some(arrays);
        Ok(())
    }
}
