//! Leaf-page codec: pure, in-memory functions over a single 4096-byte page
//! buffer. No I/O happens here; `pager` reads/writes the bytes this module
//! interprets and mutates.
//!
//! Layout (all multi-byte integers little-endian):
//!   header (24B) | bitmap (ceil(capacity/8) B) | records (capacity * 128B) | padding

use byteorder::{ByteOrder, LittleEndian};

use crate::pager::PAGE_SIZE;

pub const LEAF_HEADER_SIZE: usize = 24;
pub const RECORD_SIZE: usize = 128;
const LEAF_KIND: u16 = 1;

const KIND_OFF: usize = 0;
const RECORD_SIZE_OFF: usize = 2;
const CAPACITY_OFF: usize = 4;
const USED_COUNT_OFF: usize = 6;
const NEXT_PAGE_OFF: usize = 8;

pub type Record = [u8; RECORD_SIZE];

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument")]
    Invalid,
    #[error("unexpected leaf page kind")]
    BadKind,
    #[error("leaf page geometry is inconsistent")]
    Layout,
    #[error("bitmap popcount does not match used_count, or stray bits are set")]
    Bitmap,
    #[error("leaf page has no free slots")]
    Full,
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Invalid => "invalid_argument",
            Error::BadKind => "bad_kind",
            Error::Layout => "layout",
            Error::Bitmap => "bitmap",
            Error::Full => "full",
        }
    }
}

/// Largest C >= 1 such that `24 + ceil(C/8) + record_size*C <= 4096`,
/// recomputed rather than hard-coded so a future `record_size` change
/// stays coherent. For `record_size = 128` this evaluates to 31.
pub fn compute_capacity(record_size: usize) -> usize {
    let mut capacity = 0usize;
    loop {
        let next = capacity + 1;
        let bitmap_size = (next + 7) / 8;
        let total = LEAF_HEADER_SIZE + bitmap_size + record_size * next;
        if total > PAGE_SIZE {
            break;
        }
        capacity = next;
    }
    capacity
}

fn bitmap_size_for(capacity: usize) -> usize {
    (capacity + 7) / 8
}

fn bitmap_bit(buf: &[u8], idx: usize) -> bool {
    let byte = LEAF_HEADER_SIZE + idx / 8;
    let bit = idx % 8;
    buf[byte] & (1 << bit) != 0
}

fn set_bitmap_bit(buf: &mut [u8], idx: usize, value: bool) {
    let byte = LEAF_HEADER_SIZE + idx / 8;
    let bit = idx % 8;
    if value {
        buf[byte] |= 1 << bit;
    } else {
        buf[byte] &= !(1 << bit);
    }
}

/// Zeroes `buf`, computes capacity for `record_size`, and writes the six
/// header fields. Only `record_size == 128` is supported in v1.
pub fn init_leaf(buf: &mut [u8], record_size: u16) -> Result<(), Error> {
    if buf.len() != PAGE_SIZE {
        return Err(Error::Invalid);
    }
    if record_size as usize != RECORD_SIZE {
        return Err(Error::Invalid);
    }
    let capacity = compute_capacity(record_size as usize);
    if capacity == 0 {
        return Err(Error::Layout);
    }
    buf.fill(0);
    LittleEndian::write_u16(&mut buf[KIND_OFF..], LEAF_KIND);
    LittleEndian::write_u16(&mut buf[RECORD_SIZE_OFF..], record_size);
    LittleEndian::write_u16(&mut buf[CAPACITY_OFF..], capacity as u16);
    LittleEndian::write_u16(&mut buf[USED_COUNT_OFF..], 0);
    LittleEndian::write_u32(&mut buf[NEXT_PAGE_OFF..], 0);
    // reserved0/1/2 already zero from the fill above.
    Ok(())
}

/// Checks every structural invariant: kind, record_size, recomputed
/// capacity, used_count bounds, bitmap popcount equality, absence of
/// stray high bits, and that the header+bitmap+records geometry fits
/// in one page.
pub fn validate(buf: &[u8]) -> Result<(), Error> {
    if buf.len() != PAGE_SIZE {
        return Err(Error::Invalid);
    }
    if kind(buf) != LEAF_KIND {
        return Err(Error::BadKind);
    }
    if record_size(buf) as usize != RECORD_SIZE {
        return Err(Error::Layout);
    }
    let cap = capacity(buf) as usize;
    let computed = compute_capacity(RECORD_SIZE);
    if cap != computed {
        return Err(Error::Layout);
    }
    let used = used_count(buf) as usize;
    if used > cap {
        return Err(Error::Layout);
    }
    let bitmap_size = bitmap_size_for(cap);
    let geometry = LEAF_HEADER_SIZE + bitmap_size + RECORD_SIZE * cap;
    if geometry > PAGE_SIZE {
        return Err(Error::Layout);
    }

    let bitmap = &buf[LEAF_HEADER_SIZE..LEAF_HEADER_SIZE + bitmap_size];
    let popcount: usize = bitmap.iter().map(|b| b.count_ones() as usize).sum();
    if popcount != used {
        return Err(Error::Bitmap);
    }
    for idx in cap..bitmap_size * 8 {
        if bitmap_bit(buf, idx) {
            return Err(Error::Bitmap);
        }
    }
    Ok(())
}

/// Scans the bitmap LSB-first for the lowest free slot. Skips bytes equal
/// to `0xFF` outright, then finds the lowest zero bit within the first
/// non-full byte via a trailing-ones scan. Does not mutate the buffer.
pub fn find_free_slot(buf: &[u8]) -> Option<usize> {
    let cap = capacity(buf) as usize;
    if used_count(buf) as usize >= cap {
        return None;
    }
    let bitmap = &buf[LEAF_HEADER_SIZE..LEAF_HEADER_SIZE + bitmap_size_for(cap)];
    for (byte_idx, &byte) in bitmap.iter().enumerate() {
        if byte == 0xFF {
            continue;
        }
        let bit_idx = byte.trailing_ones() as usize;
        let idx = byte_idx * 8 + bit_idx;
        return if idx < cap { Some(idx) } else { None };
    }
    None
}

/// Marks slot `idx` used: sets its bit and increments `used_count`.
/// Requires `0 <= idx < capacity`, the bit currently clear, and
/// `used_count < capacity`.
pub fn mark_used(buf: &mut [u8], idx: usize) -> Result<(), Error> {
    let cap = capacity(buf) as usize;
    if idx >= cap {
        return Err(Error::Invalid);
    }
    let used = used_count(buf) as usize;
    if used > cap {
        return Err(Error::Layout);
    }
    if used == cap {
        return Err(Error::Full);
    }
    if bitmap_bit(buf, idx) {
        return Err(Error::Invalid);
    }
    set_bitmap_bit(buf, idx, true);
    LittleEndian::write_u16(&mut buf[USED_COUNT_OFF..], (used + 1) as u16);
    Ok(())
}

/// Marks slot `idx` free: clears its bit and decrements `used_count`.
/// Requires `0 <= idx < capacity`, the bit currently set, and
/// `used_count > 0`.
pub fn mark_free(buf: &mut [u8], idx: usize) -> Result<(), Error> {
    let cap = capacity(buf) as usize;
    if idx >= cap {
        return Err(Error::Invalid);
    }
    let used = used_count(buf) as usize;
    if used > cap {
        return Err(Error::Layout);
    }
    if used == 0 {
        return Err(Error::Invalid);
    }
    if !bitmap_bit(buf, idx) {
        return Err(Error::Invalid);
    }
    set_bitmap_bit(buf, idx, false);
    LittleEndian::write_u16(&mut buf[USED_COUNT_OFF..], (used - 1) as u16);
    Ok(())
}

fn slot_offset(cap: usize, idx: usize) -> usize {
    LEAF_HEADER_SIZE + bitmap_size_for(cap) + idx * RECORD_SIZE
}

/// Byte range of slot `idx`'s 128-byte payload. Performs no bitmap check;
/// the caller is responsible for knowing whether the slot is allocated.
pub fn slot_ptr(buf: &mut [u8], idx: usize) -> Option<&mut [u8]> {
    let cap = capacity(buf) as usize;
    if idx >= cap {
        return None;
    }
    let off = slot_offset(cap, idx);
    Some(&mut buf[off..off + RECORD_SIZE])
}

pub fn slot_ptr_const(buf: &[u8], idx: usize) -> Option<&[u8]> {
    let cap = capacity(buf) as usize;
    if idx >= cap {
        return None;
    }
    let off = slot_offset(cap, idx);
    Some(&buf[off..off + RECORD_SIZE])
}

pub fn kind(buf: &[u8]) -> u16 {
    LittleEndian::read_u16(&buf[KIND_OFF..])
}

pub fn record_size(buf: &[u8]) -> u16 {
    LittleEndian::read_u16(&buf[RECORD_SIZE_OFF..])
}

pub fn capacity(buf: &[u8]) -> u16 {
    LittleEndian::read_u16(&buf[CAPACITY_OFF..])
}

pub fn used_count(buf: &[u8]) -> u16 {
    LittleEndian::read_u16(&buf[USED_COUNT_OFF..])
}

pub fn next_page(buf: &[u8]) -> u32 {
    LittleEndian::read_u32(&buf[NEXT_PAGE_OFF..])
}

/// The sole leaf setter exposed: used by `table::insert` to link a newly
/// allocated page onto the end of a chain.
pub fn set_next_page(buf: &mut [u8], next: u32) {
    LittleEndian::write_u32(&mut buf[NEXT_PAGE_OFF..], next);
}
