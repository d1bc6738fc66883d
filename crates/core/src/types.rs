//! Core types for pagehnsw
//!
//! This module defines the foundational types:
//! - PageId: block number inside the page file
//! - ItemPointer: (page, slot) location of a tuple
//! - Datum: a single column value handed over by the host executor
//! - IndexRow: one input row for the index (row reference + column values)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block number of a page in the block store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(u32);

impl PageId {
    /// Sentinel for "no page"
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Page 0 always holds the index metadata record
    pub const META: PageId = PageId(0);

    /// Wrap a raw block number
    pub const fn new(raw: u32) -> Self {
        PageId(raw)
    }

    /// Raw block number
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// True unless this is the [`PageId::INVALID`] sentinel
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location of a tuple: a page plus a slot in that page's line-pointer array.
///
/// Used both for index tuples (element and neighbor tuples) and for the row
/// references the index stores on behalf of the host table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemPointer {
    /// Page holding the tuple
    pub page: PageId,
    /// Slot within the page
    pub slot: u16,
}

impl ItemPointer {
    /// Sentinel for an empty slot / missing reference
    pub const INVALID: ItemPointer = ItemPointer {
        page: PageId::INVALID,
        slot: 0,
    };

    /// Encoded size in bytes (u32 page + u16 slot)
    pub const ENCODED_SIZE: usize = 6;

    /// Create a location
    pub const fn new(page: PageId, slot: u16) -> Self {
        ItemPointer { page, slot }
    }

    /// True unless this is the [`ItemPointer::INVALID`] sentinel
    pub const fn is_valid(&self) -> bool {
        self.page.is_valid()
    }
}

impl fmt::Display for ItemPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.page, self.slot)
    }
}

/// Reference to a row of the indexed table.
pub type RowRef = ItemPointer;

/// A single non-null column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    /// The primary vector column
    Vector(Vec<f32>),
    /// 64-bit integer attribute
    Int(i64),
    /// 64-bit float attribute
    Float(f64),
    /// UTF-8 text attribute
    Text(String),
}

impl Datum {
    /// The vector payload, if this is a vector datum
    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Datum::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Name of the datum's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Vector(_) => "vector",
            Datum::Int(_) => "int",
            Datum::Float(_) => "float",
            Datum::Text(_) => "text",
        }
    }
}

/// One row delivered by the host's table scan.
///
/// `values[0]` is the vector column; the remaining entries are auxiliary
/// attributes in index column order. `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    /// Reference back to the table row
    pub tid: RowRef,
    /// Column values, vector first
    pub values: Vec<Option<Datum>>,
}

impl IndexRow {
    /// Row with only a vector column
    pub fn vector(tid: RowRef, vector: Vec<f32>) -> Self {
        IndexRow {
            tid,
            values: vec![Some(Datum::Vector(vector))],
        }
    }

    /// Row with a vector column followed by attribute values
    pub fn with_attributes(tid: RowRef, vector: Vec<f32>, attributes: Vec<Option<Datum>>) -> Self {
        let mut values = Vec::with_capacity(attributes.len() + 1);
        values.push(Some(Datum::Vector(vector)));
        values.extend(attributes);
        IndexRow { tid, values }
    }

    /// The vector column, or `None` when it is NULL or absent
    pub fn vector_value(&self) -> Option<&[f32]> {
        self.values.first().and_then(|v| v.as_ref()).and_then(Datum::as_vector)
    }
}
