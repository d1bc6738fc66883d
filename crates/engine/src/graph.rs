//! Graph arena: elements, neighbor arrays and candidates
//!
//! Elements are owned by a [`Graph`] and addressed by [`ElementId`]. Neighbor
//! arrays store ids, never references, so the cyclic "neighbor of my
//! neighbor" structure has a single owner.
//!
//! ## Two lifetimes of an arena
//!
//! - Bulk build: the arena owns every element of the index until the flush.
//! - Paged operations: the arena is a per-operation cache. Each persisted
//!   location is interned to exactly one id, and elements are hydrated from
//!   their pages on first use.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use pagehnsw_core::{
    element_tuple_size, layer_capacity, AttributeKind, Datum, Error, HnswOptions, IndexRow,
    ItemPointer, Result, RowRef, HEAPTIDS, HNSW_MAX_SIZE,
};

use crate::codec::payload_len;
use crate::distance::normalize;

// ============================================================================
// Handles and candidates
// ============================================================================

/// Handle of an element inside a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(usize);

impl ElementId {
    /// Wrap an arena index
    pub const fn new(index: usize) -> Self {
        ElementId(index)
    }

    /// Arena index
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Transient (element, distance) pair used by search and selection.
///
/// Ordered by distance, then by handle, so every sort and heap built from
/// candidates is deterministic.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// Element the candidate refers to
    pub id: ElementId,
    /// Distance to the current query
    pub distance: f32,
    /// Cached outcome of the closer heuristic
    pub closer: bool,
}

impl Candidate {
    /// Candidate with no cached closer decision
    pub fn new(id: ElementId, distance: f32) -> Self {
        Candidate {
            id,
            distance,
            closer: false,
        }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

// ============================================================================
// Element
// ============================================================================

/// Vector plus auxiliary attribute values of one element
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Primary vector (normalized for the cosine metric)
    pub vector: Vec<f32>,
    /// Attribute values in index column order; `None` is NULL
    pub attributes: Vec<Option<Datum>>,
}

impl Payload {
    /// Single-column payload
    pub fn vector(vector: Vec<f32>) -> Self {
        Payload {
            vector,
            attributes: Vec::new(),
        }
    }

    /// Turn an input row into a payload.
    ///
    /// Returns `Ok(None)` for rows that are not indexed: a NULL vector, or a
    /// zero vector under the cosine metric.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if the vector has the wrong length
    /// - [`Error::InvalidInput`] if the attributes do not match the index columns
    /// - [`Error::ElementTooLarge`] if the element would not fit on a page
    pub fn from_row(row: &IndexRow, options: &HnswOptions) -> Result<Option<Self>> {
        let vector = match row.vector_value() {
            Some(v) => v,
            None => return Ok(None),
        };
        if vector.len() != options.dimensions {
            return Err(Error::DimensionMismatch {
                expected: options.dimensions,
                got: vector.len(),
            });
        }
        let vector = if options.metric.normalizes() {
            match normalize(vector) {
                Some(v) => v,
                None => return Ok(None),
            }
        } else {
            vector.to_vec()
        };

        let attributes: Vec<Option<Datum>> = row.values.iter().skip(1).cloned().collect();
        if attributes.len() != options.attributes.len() {
            return Err(Error::input(format!(
                "row has {} attribute columns, index has {}",
                attributes.len(),
                options.attributes.len()
            )));
        }
        for (i, (value, kind)) in attributes.iter().zip(&options.attributes).enumerate() {
            if let Some(datum) = value {
                if !datum_matches(datum, *kind) {
                    return Err(Error::input(format!(
                        "column {} expects {}, got {}",
                        i + 2,
                        kind.name(),
                        datum.type_name()
                    )));
                }
            }
        }

        let payload = Payload { vector, attributes };
        let size = element_tuple_size(payload_len(&payload));
        if size > HNSW_MAX_SIZE {
            return Err(Error::ElementTooLarge {
                size,
                max: HNSW_MAX_SIZE,
            });
        }
        Ok(Some(payload))
    }
}

fn datum_matches(datum: &Datum, kind: AttributeKind) -> bool {
    matches!(
        (datum, kind),
        (Datum::Int(_), AttributeKind::Int)
            | (Datum::Float(_), AttributeKind::Float)
            | (Datum::Text(_), AttributeKind::Text)
    )
}

/// One neighbor of an element at one layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborEntry {
    /// Neighbor handle
    pub id: ElementId,
    /// Distance between owner and neighbor, when known. Entries decoded from
    /// a neighbor tuple carry no distance.
    pub distance: Option<f32>,
    /// Cached closer decision, valid while the array's `closer_set` is true
    pub closer: bool,
}

impl NeighborEntry {
    /// Entry carrying a candidate's distance and closer decision
    pub fn from_candidate(c: &Candidate) -> Self {
        NeighborEntry {
            id: c.id,
            distance: Some(c.distance),
            closer: c.closer,
        }
    }
}

/// Neighbors of an element at one layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborArray {
    /// Entries, at most `layer_capacity(m, lc)`
    pub items: Vec<NeighborEntry>,
    /// Whether the entries' `closer` flags came from a deterministically
    /// sorted selection and may be reused
    pub closer_set: bool,
}

impl NeighborArray {
    /// Empty array with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        NeighborArray {
            items: Vec::with_capacity(capacity),
            closer_set: false,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the array has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Position of `id` in the array
    pub fn position(&self, id: ElementId) -> Option<usize> {
        self.items.iter().position(|n| n.id == id)
    }
}

/// Empty neighbor arrays for layers `0..=level`
pub fn empty_layers(level: usize, m: usize) -> Vec<NeighborArray> {
    (0..=level)
        .map(|lc| NeighborArray::with_capacity(layer_capacity(m, lc)))
        .collect()
}

/// A graph node
#[derive(Debug, Clone)]
pub struct Element {
    /// Highest layer the element belongs to
    pub level: usize,
    /// Tombstone flag
    pub deleted: bool,
    /// Row references sharing this vector
    pub heaptids: SmallVec<[RowRef; HEAPTIDS]>,
    /// Vector and attributes; `None` until hydrated from its page
    pub payload: Option<Payload>,
    /// Per-layer neighbors; `None` until materialized
    pub neighbors: Option<Vec<NeighborArray>>,
    /// Location of the element tuple, once persisted
    pub location: Option<ItemPointer>,
    /// Location of the neighbor tuple, once persisted
    pub neighbor_location: Option<ItemPointer>,
}

impl Element {
    /// A new, unpersisted element with empty neighbor arrays
    pub fn new(level: usize, tid: RowRef, payload: Payload, m: usize) -> Self {
        let mut heaptids = SmallVec::new();
        heaptids.push(tid);
        Element {
            level,
            deleted: false,
            heaptids,
            payload: Some(payload),
            neighbors: Some(empty_layers(level, m)),
            location: None,
            neighbor_location: None,
        }
    }

    /// Placeholder for a persisted element that has not been read yet
    pub fn stub(location: ItemPointer) -> Self {
        Element {
            level: 0,
            deleted: false,
            heaptids: SmallVec::new(),
            payload: None,
            neighbors: None,
            location: Some(location),
            neighbor_location: None,
        }
    }

    /// Tombstoned elements still route searches but are never selected.
    ///
    /// An element without row references counts as tombstoned.
    pub fn is_tombstoned(&self) -> bool {
        self.deleted || self.heaptids.is_empty()
    }

    /// Whether the payload has been read
    pub fn is_hydrated(&self) -> bool {
        self.payload.is_some()
    }

    /// The payload, failing if the element was never hydrated
    pub fn payload(&self) -> Result<&Payload> {
        self.payload.as_ref().ok_or_else(|| {
            Error::corruption(format!(
                "element at {} used before it was loaded",
                self.location.unwrap_or(ItemPointer::INVALID)
            ))
        })
    }

    /// Neighbor array at layer `lc`, if materialized
    pub fn layer(&self, lc: usize) -> Option<&NeighborArray> {
        self.neighbors.as_ref().and_then(|n| n.get(lc))
    }

    /// Mutable neighbor array at layer `lc`, if materialized
    pub fn layer_mut(&mut self, lc: usize) -> Option<&mut NeighborArray> {
        self.neighbors.as_mut().and_then(|n| n.get_mut(lc))
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Owner of all elements of one build or one paged operation
#[derive(Debug, Default)]
pub struct Graph {
    elements: Vec<Element>,
    by_location: FxHashMap<ItemPointer, ElementId>,
}

impl Graph {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element and return its handle
    pub fn push(&mut self, element: Element) -> ElementId {
        let id = ElementId(self.elements.len());
        if let Some(location) = element.location {
            self.by_location.insert(location, id);
        }
        self.elements.push(element);
        id
    }

    /// Drop the most recently pushed element.
    ///
    /// Only valid while nothing else refers to it, i.e. before any
    /// reciprocal connection was made.
    pub fn discard_last(&mut self, id: ElementId) {
        debug_assert_eq!(id.0 + 1, self.elements.len());
        if let Some(element) = self.elements.pop() {
            if let Some(location) = element.location {
                self.by_location.remove(&location);
            }
        }
    }

    /// Handle for a persisted location, creating a stub on first sight
    pub fn intern(&mut self, location: ItemPointer) -> ElementId {
        if let Some(&id) = self.by_location.get(&location) {
            return id;
        }
        self.push(Element::stub(location))
    }

    /// Handle already interned for `location`
    pub fn lookup(&self, location: ItemPointer) -> Option<ElementId> {
        self.by_location.get(&location).copied()
    }

    /// Record the persisted location of an element
    pub fn set_location(&mut self, id: ElementId, location: ItemPointer) {
        self.elements[id.0].location = Some(location);
        self.by_location.insert(location, id);
    }

    /// Element behind a handle
    pub fn get(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    /// Mutable element behind a handle
    pub fn get_mut(&mut self, id: ElementId) -> &mut Element {
        &mut self.elements[id.0]
    }

    /// Mutable neighbor array, failing if it was never materialized
    pub fn layer_mut(&mut self, id: ElementId, lc: usize) -> Result<&mut NeighborArray> {
        self.elements[id.0].layer_mut(lc).ok_or_else(|| {
            Error::corruption(format!("element {} has no neighbors at layer {}", id.0, lc))
        })
    }

    /// Number of elements in the arena
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the arena is empty
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Handles in insertion order
    pub fn ids(&self) -> impl Iterator<Item = ElementId> {
        (0..self.elements.len()).map(ElementId)
    }
}
