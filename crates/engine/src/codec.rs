//! Element and neighbor codec
//!
//! # Element tuple
//!
//! ```text
//! type u8 (1) | level u8 | deleted u8 | pad u8
//! heaptids   HEAPTIDS x (page u32, slot u16), unused slots invalid
//! neighbortid (page u32, slot u16)
//! payload    dim u16 | f32 x dim | attr_count u8 | attributes
//! ```
//!
//! Each attribute is a tag byte followed by its value:
//! `0` null, `1` int (i64), `2` float (f64), `3` text (u16 length + UTF-8).
//!
//! # Neighbor tuple
//!
//! ```text
//! type u8 (2) | pad u8 | count u16 | count x (page u32, slot u16)
//! ```
//!
//! Slots are laid out from the element's highest layer down to layer 0, each
//! layer holding exactly `layer_capacity(m, lc)` slots. A decoded tuple whose
//! count disagrees with `(level + 2) * m` is reported as corrupt and read as
//! empty neighbor lists; it never fails the caller.
//!
//! # Metadata record
//!
//! Item 0 of page 0. See [`IndexMeta`].
//!
//! All integers are little-endian.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use smallvec::SmallVec;

use pagehnsw_core::limits::{ELEMENT_TUPLE_HEADER_SIZE, NEIGHBOR_TUPLE_HEADER_SIZE};
use pagehnsw_core::{
    layer_capacity, neighbor_slot_count, Datum, Error, ItemPointer, PageId, Result, RowRef,
    HEAPTIDS, HNSW_MAX_SIZE,
};

use crate::graph::{Element, Graph, Payload};

/// Type byte of an element tuple
pub const ELEMENT_TUPLE_TYPE: u8 = 1;

/// Type byte of a neighbor tuple
pub const NEIGHBOR_TUPLE_TYPE: u8 = 2;

/// Magic number of the metadata record
pub const HNSW_MAGIC_NUMBER: u32 = 0xA953_A953;

/// On-disk format version
pub const HNSW_VERSION: u32 = 1;

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_TEXT: u8 = 3;

fn truncated(what: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |e| Error::corruption(format!("truncated {}: {}", what, e))
}

fn write_tid<W: Write>(w: &mut W, tid: ItemPointer) -> io::Result<()> {
    w.write_u32::<LittleEndian>(tid.page.as_u32())?;
    w.write_u16::<LittleEndian>(tid.slot)
}

fn read_tid<R: Read>(r: &mut R) -> io::Result<ItemPointer> {
    let page = r.read_u32::<LittleEndian>()?;
    let slot = r.read_u16::<LittleEndian>()?;
    Ok(ItemPointer::new(PageId::new(page), slot))
}

// ============================================================================
// Payload
// ============================================================================

/// Encoded size of a payload
pub fn payload_len(payload: &Payload) -> usize {
    let attrs: usize = payload
        .attributes
        .iter()
        .map(|a| {
            1 + match a {
                None => 0,
                Some(Datum::Int(_)) | Some(Datum::Float(_)) => 8,
                Some(Datum::Text(s)) => 2 + s.len(),
                Some(Datum::Vector(v)) => 2 + v.len() * 4,
            }
        })
        .sum();
    2 + payload.vector.len() * 4 + 1 + attrs
}

fn write_payload<W: Write>(w: &mut W, payload: &Payload) -> Result<()> {
    w.write_u16::<LittleEndian>(payload.vector.len() as u16)?;
    for &x in &payload.vector {
        w.write_f32::<LittleEndian>(x)?;
    }
    w.write_u8(payload.attributes.len() as u8)?;
    for value in &payload.attributes {
        match value {
            None => w.write_u8(TAG_NULL)?,
            Some(Datum::Int(v)) => {
                w.write_u8(TAG_INT)?;
                w.write_i64::<LittleEndian>(*v)?;
            }
            Some(Datum::Float(v)) => {
                w.write_u8(TAG_FLOAT)?;
                w.write_f64::<LittleEndian>(*v)?;
            }
            Some(Datum::Text(s)) => {
                w.write_u8(TAG_TEXT)?;
                w.write_u16::<LittleEndian>(s.len() as u16)?;
                w.write_all(s.as_bytes())?;
            }
            Some(Datum::Vector(_)) => {
                return Err(Error::input("vector values cannot be stored as attributes"));
            }
        }
    }
    Ok(())
}

fn read_payload<R: Read>(r: &mut R) -> Result<Payload> {
    let dim = r.read_u16::<LittleEndian>().map_err(truncated("payload"))? as usize;
    let mut vector = Vec::with_capacity(dim);
    for _ in 0..dim {
        vector.push(r.read_f32::<LittleEndian>().map_err(truncated("vector"))?);
    }
    let count = r.read_u8().map_err(truncated("payload"))? as usize;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = r.read_u8().map_err(truncated("attribute"))?;
        let value = match tag {
            TAG_NULL => None,
            TAG_INT => Some(Datum::Int(
                r.read_i64::<LittleEndian>().map_err(truncated("attribute"))?,
            )),
            TAG_FLOAT => Some(Datum::Float(
                r.read_f64::<LittleEndian>().map_err(truncated("attribute"))?,
            )),
            TAG_TEXT => {
                let len = r.read_u16::<LittleEndian>().map_err(truncated("attribute"))? as usize;
                let mut buf = vec![0u8; len];
                r.read_exact(&mut buf).map_err(truncated("attribute"))?;
                let text = String::from_utf8(buf)
                    .map_err(|_| Error::corruption("attribute text is not UTF-8"))?;
                Some(Datum::Text(text))
            }
            other => {
                return Err(Error::corruption(format!("unknown attribute tag {}", other)));
            }
        };
        attributes.push(value);
    }
    Ok(Payload { vector, attributes })
}

// ============================================================================
// Element tuple
// ============================================================================

/// Decoded element tuple
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTuple {
    /// Element level
    pub level: usize,
    /// Tombstone flag
    pub deleted: bool,
    /// Valid row references, in order
    pub heaptids: SmallVec<[RowRef; HEAPTIDS]>,
    /// Location of the element's neighbor tuple
    pub neighbor_tid: ItemPointer,
    /// Vector and attributes
    pub payload: Payload,
}

impl ElementTuple {
    /// Tuple for an element; the neighbor location is taken from the
    /// element or left invalid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if the element was never hydrated.
    pub fn from_element(element: &Element) -> Result<Self> {
        Ok(ElementTuple {
            level: element.level,
            deleted: element.deleted,
            heaptids: element.heaptids.iter().copied().take(HEAPTIDS).collect(),
            neighbor_tid: element.neighbor_location.unwrap_or(ItemPointer::INVALID),
            payload: element.payload()?.clone(),
        })
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        ELEMENT_TUPLE_HEADER_SIZE + payload_len(&self.payload)
    }

    /// Serialize.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementTooLarge`] if the tuple does not fit on an
    /// empty page.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = self.encoded_len();
        if size > HNSW_MAX_SIZE {
            return Err(Error::ElementTooLarge {
                size,
                max: HNSW_MAX_SIZE,
            });
        }

        let mut buf = Vec::with_capacity(size);
        buf.write_u8(ELEMENT_TUPLE_TYPE)?;
        buf.write_u8(self.level as u8)?;
        buf.write_u8(self.deleted as u8)?;
        buf.write_u8(0)?;
        for i in 0..HEAPTIDS {
            write_tid(
                &mut buf,
                self.heaptids.get(i).copied().unwrap_or(ItemPointer::INVALID),
            )?;
        }
        write_tid(&mut buf, self.neighbor_tid)?;
        write_payload(&mut buf, &self.payload)?;
        debug_assert_eq!(buf.len(), size);
        Ok(buf)
    }

    /// Deserialize.
    ///
    /// Row references are read up to the first invalid slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if the bytes are not an element tuple.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = bytes;
        let kind = r.read_u8().map_err(truncated("element tuple"))?;
        if kind != ELEMENT_TUPLE_TYPE {
            return Err(Error::corruption(format!(
                "expected element tuple, found type {}",
                kind
            )));
        }
        let level = r.read_u8().map_err(truncated("element tuple"))? as usize;
        let deleted = r.read_u8().map_err(truncated("element tuple"))? != 0;
        r.read_u8().map_err(truncated("element tuple"))?;

        let mut heaptids = SmallVec::new();
        let mut done = false;
        for _ in 0..HEAPTIDS {
            let tid = read_tid(&mut r).map_err(truncated("element tuple"))?;
            if !tid.is_valid() {
                done = true;
            }
            if !done {
                heaptids.push(tid);
            }
        }
        let neighbor_tid = read_tid(&mut r).map_err(truncated("element tuple"))?;
        let payload = read_payload(&mut r)?;

        Ok(ElementTuple {
            level,
            deleted,
            heaptids,
            neighbor_tid,
            payload,
        })
    }
}

/// True if `bytes` look like an element tuple
pub fn is_element_tuple(bytes: &[u8]) -> bool {
    bytes.first() == Some(&ELEMENT_TUPLE_TYPE)
}

// ============================================================================
// Neighbor tuple
// ============================================================================

/// Decoded neighbor tuple: a flat slot array, highest layer first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTuple {
    /// Neighbor locations; invalid for empty slots
    pub slots: Vec<ItemPointer>,
}

/// Outcome of reading a neighbor tuple against its element's level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedNeighbors {
    /// Valid neighbor locations per layer, index = layer
    Layers(Vec<Vec<ItemPointer>>),
    /// The tuple could not be trusted; treat as no neighbors
    Corrupt(String),
}

impl DecodedNeighbors {
    /// Per-layer locations, empty lists when corrupt
    pub fn into_layers(self, level: usize) -> Vec<Vec<ItemPointer>> {
        match self {
            DecodedNeighbors::Layers(layers) => layers,
            DecodedNeighbors::Corrupt(_) => vec![Vec::new(); level + 1],
        }
    }
}

impl NeighborTuple {
    /// All-empty tuple for an element of `level`
    pub fn placeholder(level: usize, m: usize) -> Self {
        NeighborTuple {
            slots: vec![ItemPointer::INVALID; neighbor_slot_count(level, m)],
        }
    }

    /// Tuple holding an element's current neighbor arrays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if a neighbor has no location yet.
    pub fn from_element(graph: &Graph, element: &Element, m: usize) -> Result<Self> {
        let mut slots = Vec::with_capacity(neighbor_slot_count(element.level, m));
        for lc in (0..=element.level).rev() {
            let lm = layer_capacity(m, lc);
            let items = element.layer(lc).map(|a| a.items.as_slice()).unwrap_or(&[]);
            for i in 0..lm {
                match items.get(i) {
                    Some(entry) => {
                        let location = graph.get(entry.id).location.ok_or_else(|| {
                            Error::corruption("neighbor has no location when writing neighbor tuple")
                        })?;
                        slots.push(location);
                    }
                    None => slots.push(ItemPointer::INVALID),
                }
            }
        }
        Ok(NeighborTuple { slots })
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        NEIGHBOR_TUPLE_HEADER_SIZE + self.slots.len() * ItemPointer::ENCODED_SIZE
    }

    /// Serialize
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(NEIGHBOR_TUPLE_TYPE);
        buf.push(0);
        buf.extend_from_slice(&(self.slots.len() as u16).to_le_bytes());
        for slot in &self.slots {
            buf.extend_from_slice(&slot.page.as_u32().to_le_bytes());
            buf.extend_from_slice(&slot.slot.to_le_bytes());
        }
        buf
    }

    /// Deserialize the raw slot array, `None` if the bytes are malformed
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut r = bytes;
        if r.read_u8().ok()? != NEIGHBOR_TUPLE_TYPE {
            return None;
        }
        r.read_u8().ok()?;
        let count = r.read_u16::<LittleEndian>().ok()? as usize;
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            slots.push(read_tid(&mut r).ok()?);
        }
        Some(NeighborTuple { slots })
    }

    /// Split into per-layer neighbor locations for an element of `level`.
    ///
    /// Slot `i` belongs to layer `max(level - i / m, 0)`. Invalid slots are
    /// dropped.
    pub fn layers(&self, level: usize, m: usize) -> DecodedNeighbors {
        let expected = neighbor_slot_count(level, m);
        if self.slots.len() != expected {
            return DecodedNeighbors::Corrupt(format!(
                "neighbor tuple has {} slots, expected {} for level {}",
                self.slots.len(),
                expected,
                level
            ));
        }
        let mut layers = vec![Vec::new(); level + 1];
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.is_valid() {
                continue;
            }
            let lc = level.saturating_sub(i / m);
            layers[lc].push(*slot);
        }
        DecodedNeighbors::Layers(layers)
    }

    /// First slot index of layer `lc` for an element of `level`
    pub fn layer_start(level: usize, lc: usize, m: usize) -> usize {
        (level - lc) * m
    }
}

/// Read a neighbor tuple, degrading malformed bytes to a corrupt outcome
pub fn decode_neighbors(bytes: &[u8], level: usize, m: usize) -> DecodedNeighbors {
    match NeighborTuple::decode(bytes) {
        Some(tuple) => tuple.layers(level, m),
        None => DecodedNeighbors::Corrupt("malformed neighbor tuple".to_string()),
    }
}

// ============================================================================
// Metadata record
// ============================================================================

/// Index metadata, item 0 of page 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMeta {
    /// Vector dimension
    pub dimensions: usize,
    /// Base degree
    pub m: usize,
    /// Build-time beam width
    pub ef_construction: usize,
    /// Entry point location and level
    pub entry: Option<(ItemPointer, usize)>,
    /// First page to try when appending elements
    pub insert_page: PageId,
}

impl IndexMeta {
    /// Encoded size in bytes
    pub const ENCODED_SIZE: usize = 4 + 4 + 4 + 2 + 2 + ItemPointer::ENCODED_SIZE + 2 + 4;

    /// Metadata of a freshly created index
    pub fn new(dimensions: usize, m: usize, ef_construction: usize) -> Self {
        IndexMeta {
            dimensions,
            m,
            ef_construction,
            entry: None,
            insert_page: PageId::INVALID,
        }
    }

    /// Serialize
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::ENCODED_SIZE);
        buf.write_u32::<LittleEndian>(HNSW_MAGIC_NUMBER)?;
        buf.write_u32::<LittleEndian>(HNSW_VERSION)?;
        buf.write_u32::<LittleEndian>(self.dimensions as u32)?;
        buf.write_u16::<LittleEndian>(self.m as u16)?;
        buf.write_u16::<LittleEndian>(self.ef_construction as u16)?;
        match self.entry {
            Some((tid, level)) => {
                write_tid(&mut buf, tid)?;
                buf.write_i16::<LittleEndian>(level as i16)?;
            }
            None => {
                write_tid(&mut buf, ItemPointer::INVALID)?;
                buf.write_i16::<LittleEndian>(-1)?;
            }
        }
        buf.write_u32::<LittleEndian>(self.insert_page.as_u32())?;
        Ok(buf)
    }

    /// Deserialize.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] on a bad magic number or version.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = bytes;
        let magic = r.read_u32::<LittleEndian>().map_err(truncated("metadata"))?;
        if magic != HNSW_MAGIC_NUMBER {
            return Err(Error::corruption(format!(
                "bad metadata magic {:#010x}",
                magic
            )));
        }
        let version = r.read_u32::<LittleEndian>().map_err(truncated("metadata"))?;
        if version != HNSW_VERSION {
            return Err(Error::corruption(format!(
                "unsupported index version {}",
                version
            )));
        }
        let dimensions = r.read_u32::<LittleEndian>().map_err(truncated("metadata"))? as usize;
        let m = r.read_u16::<LittleEndian>().map_err(truncated("metadata"))? as usize;
        let ef_construction = r.read_u16::<LittleEndian>().map_err(truncated("metadata"))? as usize;
        let tid = read_tid(&mut r).map_err(truncated("metadata"))?;
        let level = r.read_i16::<LittleEndian>().map_err(truncated("metadata"))?;
        let insert_page = PageId::new(r.read_u32::<LittleEndian>().map_err(truncated("metadata"))?);

        let entry = if tid.is_valid() && level >= 0 {
            Some((tid, level as usize))
        } else {
            None
        };
        Ok(IndexMeta {
            dimensions,
            m,
            ef_construction,
            entry,
            insert_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Candidate, NeighborEntry};
    use pagehnsw_core::neighbor_tuple_size;
    use proptest::prelude::*;

    fn tid(page: u32, slot: u16) -> ItemPointer {
        ItemPointer::new(PageId::new(page), slot)
    }

    #[test]
    fn test_element_tuple_round_trip() {
        let mut heaptids = SmallVec::new();
        heaptids.push(tid(10, 1));
        heaptids.push(tid(11, 2));
        let etup = ElementTuple {
            level: 3,
            deleted: false,
            heaptids,
            neighbor_tid: tid(4, 7),
            payload: Payload {
                vector: vec![1.5, -2.0, 0.25],
                attributes: vec![
                    Some(Datum::Int(-7)),
                    None,
                    Some(Datum::Float(2.5)),
                    Some(Datum::Text("hé".to_string())),
                ],
            },
        };
        let bytes = etup.encode().unwrap();
        assert_eq!(bytes.len(), etup.encoded_len());
        assert!(is_element_tuple(&bytes));
        assert_eq!(ElementTuple::decode(&bytes).unwrap(), etup);
    }

    #[test]
    fn test_tombstone_keeps_encoded_length() {
        let mut heaptids = SmallVec::new();
        heaptids.push(tid(10, 1));
        let mut etup = ElementTuple {
            level: 0,
            deleted: false,
            heaptids,
            neighbor_tid: tid(4, 7),
            payload: Payload::vector(vec![1.0, 2.0]),
        };
        let before = etup.encode().unwrap().len();
        etup.deleted = true;
        etup.heaptids.clear();
        let bytes = etup.encode().unwrap();
        assert_eq!(bytes.len(), before);
        let decoded = ElementTuple::decode(&bytes).unwrap();
        assert!(decoded.deleted);
        assert!(decoded.heaptids.is_empty());
    }

    #[test]
    fn test_element_too_large() {
        let etup = ElementTuple {
            level: 0,
            deleted: false,
            heaptids: SmallVec::new(),
            neighbor_tid: ItemPointer::INVALID,
            payload: Payload::vector(vec![0.0; 2100]),
        };
        assert!(matches!(
            etup.encode(),
            Err(Error::ElementTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_neighbor_bytes_as_element() {
        let bytes = NeighborTuple::placeholder(0, 2).encode();
        assert!(ElementTuple::decode(&bytes).is_err());
        assert!(ElementTuple::decode(&[]).is_err());
    }

    #[test]
    fn test_neighbor_tuple_layer_mapping() {
        // level 1, m = 2: layer 1 has slots 0..2, layer 0 has slots 2..6
        let mut tuple = NeighborTuple::placeholder(1, 2);
        assert_eq!(tuple.encoded_len(), neighbor_tuple_size(1, 2));
        tuple.slots[0] = tid(1, 1);
        tuple.slots[2] = tid(2, 1);
        tuple.slots[5] = tid(3, 1);

        let bytes = tuple.encode();
        let layers = decode_neighbors(&bytes, 1, 2).into_layers(1);
        assert_eq!(layers[1], vec![tid(1, 1)]);
        assert_eq!(layers[0], vec![tid(2, 1), tid(3, 1)]);
        assert_eq!(NeighborTuple::layer_start(1, 0, 2), 2);
        assert_eq!(NeighborTuple::layer_start(1, 1, 2), 0);
    }

    #[test]
    fn test_neighbor_count_mismatch_is_empty() {
        let bytes = NeighborTuple::placeholder(1, 2).encode();
        let decoded = decode_neighbors(&bytes, 2, 2);
        assert!(matches!(decoded, DecodedNeighbors::Corrupt(_)));
        let layers = decoded.into_layers(2);
        assert_eq!(layers.len(), 3);
        assert!(layers.iter().all(|l| l.is_empty()));
    }

    #[test]
    fn test_malformed_neighbor_bytes_are_corrupt() {
        assert!(matches!(
            decode_neighbors(&[2, 0, 9], 0, 2),
            DecodedNeighbors::Corrupt(_)
        ));
        assert!(matches!(
            decode_neighbors(&[1, 0, 0, 0], 0, 2),
            DecodedNeighbors::Corrupt(_)
        ));
    }

    #[test]
    fn test_neighbor_tuple_from_element() {
        let mut graph = Graph::new();
        let a = graph.intern(tid(5, 0));
        let b = graph.intern(tid(6, 0));
        let owner = graph.push(Element::new(
            1,
            tid(9, 9),
            Payload::vector(vec![0.0]),
            2,
        ));
        graph
            .layer_mut(owner, 1)
            .unwrap()
            .items
            .push(NeighborEntry::from_candidate(&Candidate::new(a, 1.0)));
        graph
            .layer_mut(owner, 0)
            .unwrap()
            .items
            .push(NeighborEntry::from_candidate(&Candidate::new(b, 2.0)));

        let tuple = NeighborTuple::from_element(&graph, graph.get(owner), 2).unwrap();
        assert_eq!(tuple.slots.len(), 6);
        assert_eq!(tuple.slots[0], tid(5, 0));
        assert_eq!(tuple.slots[2], tid(6, 0));
        assert!(!tuple.slots[1].is_valid());

        let unplaced = graph.push(Element::new(0, tid(1, 1), Payload::vector(vec![0.0]), 2));
        graph
            .layer_mut(owner, 0)
            .unwrap()
            .items
            .push(NeighborEntry::from_candidate(&Candidate::new(unplaced, 3.0)));
        assert!(NeighborTuple::from_element(&graph, graph.get(owner), 2).is_err());
    }

    #[test]
    fn test_meta_round_trip() {
        let mut meta = IndexMeta::new(96, 16, 64);
        assert_eq!(meta.encode().unwrap().len(), IndexMeta::ENCODED_SIZE);
        assert_eq!(IndexMeta::decode(&meta.encode().unwrap()).unwrap(), meta);

        meta.entry = Some((tid(3, 2), 4));
        meta.insert_page = PageId::new(7);
        assert_eq!(IndexMeta::decode(&meta.encode().unwrap()).unwrap(), meta);
    }

    #[test]
    fn test_meta_bad_magic() {
        let mut bytes = IndexMeta::new(3, 2, 8).encode().unwrap();
        bytes[0] ^= 0xFF;
        let err = IndexMeta::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    proptest! {
        #[test]
        fn prop_neighbor_layers_cover_every_valid_slot(
            level in 0usize..5,
            m in 2usize..6,
            fill in proptest::collection::vec(any::<bool>(), 0..40),
        ) {
            let mut tuple = NeighborTuple::placeholder(level, m);
            let mut valid = 0;
            for (i, slot) in tuple.slots.iter_mut().enumerate() {
                if fill.get(i).copied().unwrap_or(false) {
                    *slot = tid(i as u32 + 1, 0);
                    valid += 1;
                }
            }
            let layers = decode_neighbors(&tuple.encode(), level, m).into_layers(level);
            prop_assert_eq!(layers.len(), level + 1);
            prop_assert_eq!(layers.iter().map(|l| l.len()).sum::<usize>(), valid);
            for (lc, layer) in layers.iter().enumerate() {
                prop_assert!(layer.len() <= layer_capacity(m, lc));
            }
        }
    }
}
