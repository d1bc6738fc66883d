//! Slotted page
//!
//! # Layout (PAGE_SIZE bytes)
//!
//! ```text
//! 0..4    checksum   u32  CRC32 of bytes 4..PAGE_SIZE (maintained by the file store)
//! 4..6    lower      u16  end of the line-pointer array
//! 6..8    upper      u16  start of item data
//! 8..12   next_page  u32  link to the next page of the chain (u32::MAX = none)
//! 12..14  kind       u16  PAGE_KIND
//! 14..24  reserved
//! 24..    line pointers: (offset u16, length u16) per slot, growing up
//! ...     item data, growing down from PAGE_SIZE
//! ```
//!
//! Slots are numbered from 0 in insertion order and are never removed.
//! Items can be rewritten in place only with a value of the same length.

use byteorder::{ByteOrder, LittleEndian};
use pagehnsw_core::{Error, PageId, Result, LINE_POINTER_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE};

/// Kind marker written into every initialized page
pub const PAGE_KIND: u16 = 0xFF90;

const CHECKSUM_OFFSET: usize = 0;
const LOWER_OFFSET: usize = 4;
const UPPER_OFFSET: usize = 6;
const NEXT_OFFSET: usize = 8;
const KIND_OFFSET: usize = 12;

/// A fixed-size slotted page.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8]>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("items", &self.item_count())
            .field("free", &self.free_space())
            .field("next", &self.next_page())
            .finish()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// An initialized, empty page with no successor
    pub fn new() -> Self {
        let mut page = Page {
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        };
        page.init();
        page
    }

    /// Reset to an empty page with no successor
    pub fn init(&mut self) {
        self.data.fill(0);
        self.set_lower(PAGE_HEADER_SIZE as u16);
        self.set_upper(PAGE_SIZE);
        LittleEndian::write_u32(&mut self.data[NEXT_OFFSET..], PageId::INVALID.as_u32());
        LittleEndian::write_u16(&mut self.data[KIND_OFFSET..], PAGE_KIND);
    }

    /// Wrap raw page bytes read from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if the buffer has the wrong size or the
    /// header bounds are inconsistent.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(Error::corruption(format!(
                "page buffer of {} bytes, expected {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let page = Page {
            data: bytes.into_boxed_slice(),
        };
        if page.kind() != PAGE_KIND {
            return Err(Error::corruption(format!(
                "unexpected page kind {:#06x}",
                page.kind()
            )));
        }
        let lower = page.lower();
        let upper = page.upper();
        if lower < PAGE_HEADER_SIZE || lower > upper || upper > PAGE_SIZE {
            return Err(Error::corruption(format!(
                "page bounds out of range (lower {}, upper {})",
                lower, upper
            )));
        }
        Ok(page)
    }

    /// Raw page bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// CRC32 of everything after the checksum field
    pub fn compute_checksum(&self) -> u32 {
        crc32fast::hash(&self.data[CHECKSUM_OFFSET + 4..])
    }

    /// Stored checksum
    pub fn checksum(&self) -> u32 {
        LittleEndian::read_u32(&self.data[CHECKSUM_OFFSET..])
    }

    /// Recompute and store the checksum
    pub fn update_checksum(&mut self) {
        let crc = self.compute_checksum();
        LittleEndian::write_u32(&mut self.data[CHECKSUM_OFFSET..], crc);
    }

    /// Whether the stored checksum matches the content
    pub fn verify_checksum(&self) -> bool {
        self.checksum() == self.compute_checksum()
    }

    fn kind(&self) -> u16 {
        LittleEndian::read_u16(&self.data[KIND_OFFSET..])
    }

    fn lower(&self) -> usize {
        LittleEndian::read_u16(&self.data[LOWER_OFFSET..]) as usize
    }

    fn set_lower(&mut self, lower: u16) {
        LittleEndian::write_u16(&mut self.data[LOWER_OFFSET..], lower);
    }

    fn upper(&self) -> usize {
        LittleEndian::read_u16(&self.data[UPPER_OFFSET..]) as usize
    }

    fn set_upper(&mut self, upper: usize) {
        LittleEndian::write_u16(&mut self.data[UPPER_OFFSET..], upper as u16);
    }

    /// Successor in the page chain
    pub fn next_page(&self) -> PageId {
        PageId::new(LittleEndian::read_u32(&self.data[NEXT_OFFSET..]))
    }

    /// Link this page to a successor
    pub fn set_next_page(&mut self, next: PageId) {
        LittleEndian::write_u32(&mut self.data[NEXT_OFFSET..], next.as_u32());
    }

    /// Number of slots in use
    pub fn item_count(&self) -> u16 {
        ((self.lower() - PAGE_HEADER_SIZE) / LINE_POINTER_SIZE) as u16
    }

    /// Bytes available for one more item, line pointer already accounted for
    pub fn free_space(&self) -> usize {
        (self.upper() - self.lower()).saturating_sub(LINE_POINTER_SIZE)
    }

    /// Slot number the next `add_item` will return
    pub fn next_slot(&self) -> u16 {
        self.item_count()
    }

    fn line_pointer(&self, slot: u16) -> Option<(usize, usize)> {
        if slot >= self.item_count() {
            return None;
        }
        let at = PAGE_HEADER_SIZE + slot as usize * LINE_POINTER_SIZE;
        let offset = LittleEndian::read_u16(&self.data[at..]) as usize;
        let len = LittleEndian::read_u16(&self.data[at + 2..]) as usize;
        Some((offset, len))
    }

    /// Append an item and return its slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PageFull`] if the item does not fit. `page` is only
    /// used for the error message.
    pub fn add_item(&mut self, page: PageId, item: &[u8]) -> Result<u16> {
        if item.len() > self.free_space() || item.len() > u16::MAX as usize {
            return Err(Error::PageFull {
                page,
                needed: item.len(),
            });
        }
        let slot = self.item_count();
        let upper = self.upper() - item.len();
        self.data[upper..upper + item.len()].copy_from_slice(item);

        let at = self.lower();
        LittleEndian::write_u16(&mut self.data[at..], upper as u16);
        LittleEndian::write_u16(&mut self.data[at + 2..], item.len() as u16);

        self.set_lower((at + LINE_POINTER_SIZE) as u16);
        self.set_upper(upper);
        Ok(slot)
    }

    /// Item bytes at `slot`
    pub fn item(&self, slot: u16) -> Option<&[u8]> {
        self.line_pointer(slot)
            .map(|(offset, len)| &self.data[offset..offset + len])
    }

    /// Replace the item at `slot` with a value of the same length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if the slot does not exist or the length differs.
    pub fn overwrite_item(&mut self, slot: u16, item: &[u8]) -> Result<()> {
        let (offset, len) = self
            .line_pointer(slot)
            .ok_or_else(|| Error::corruption(format!("slot {} does not exist", slot)))?;
        if len != item.len() {
            return Err(Error::corruption(format!(
                "overwrite of slot {} with {} bytes, item has {}",
                slot,
                item.len(),
                len
            )));
        }
        self.data[offset..offset + len].copy_from_slice(item);
        Ok(())
    }
}
