//! Page geometry and size limits
//!
//! Every size bound in the index is derived from the fixed page size: the
//! largest tuple a page can hold, the number of neighbor slots an element
//! needs at a given level, and the highest level whose neighbor tuple still
//! fits on a single page.
//!
//! ## Layer capacities
//!
//! Layer 0 carries the full connectivity of the graph and is granted `2 * m`
//! neighbors; every upper layer gets `m`. An element of level `L` therefore
//! owns `2m + L*m = (L + 2) * m` neighbor slots, stored highest layer first.

use crate::types::ItemPointer;

/// Size of every page in bytes
pub const PAGE_SIZE: usize = 8192;

/// Bytes reserved at the start of each page (checksum, bounds, link, kind)
pub const PAGE_HEADER_SIZE: usize = 24;

/// Bytes per line pointer (u16 offset + u16 length)
pub const LINE_POINTER_SIZE: usize = 4;

/// Largest single item an empty page can accept
pub const HNSW_MAX_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE - LINE_POINTER_SIZE;

/// Row references stored inline in an element tuple
pub const HEAPTIDS: usize = 10;

/// Maximum vector dimension accepted at index creation
pub const HNSW_MAX_DIM: usize = 2000;

/// Fixed part of an element tuple: type, level, deleted, pad, row refs, neighbor tid
pub const ELEMENT_TUPLE_HEADER_SIZE: usize =
    4 + HEAPTIDS * ItemPointer::ENCODED_SIZE + ItemPointer::ENCODED_SIZE;

/// Fixed part of a neighbor tuple: type, pad, u16 count
pub const NEIGHBOR_TUPLE_HEADER_SIZE: usize = 4;

/// Neighbor capacity of layer `lc` for base degree `m`
pub const fn layer_capacity(m: usize, lc: usize) -> usize {
    if lc == 0 {
        m * 2
    } else {
        m
    }
}

/// Total neighbor slots of an element with level `level`
pub const fn neighbor_slot_count(level: usize, m: usize) -> usize {
    (level + 2) * m
}

/// Encoded size of a neighbor tuple for an element with level `level`
pub const fn neighbor_tuple_size(level: usize, m: usize) -> usize {
    NEIGHBOR_TUPLE_HEADER_SIZE + neighbor_slot_count(level, m) * ItemPointer::ENCODED_SIZE
}

/// Encoded size of an element tuple with a payload of `payload_len` bytes
pub const fn element_tuple_size(payload_len: usize) -> usize {
    ELEMENT_TUPLE_HEADER_SIZE + payload_len
}

/// Highest level an element may be assigned for base degree `m`.
///
/// Chosen so the element's neighbor tuple always fits on one page; never
/// above 255 because the level is stored in a single byte.
pub const fn max_level(m: usize) -> usize {
    let slots = (PAGE_SIZE - PAGE_HEADER_SIZE - NEIGHBOR_TUPLE_HEADER_SIZE - LINE_POINTER_SIZE)
        / ItemPointer::ENCODED_SIZE
        / m;
    let level = slots.saturating_sub(2);
    if level > 255 {
        255
    } else {
        level
    }
}
