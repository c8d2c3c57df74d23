//! Table manager: composes `pager` + `leaf` into the logical table API —
//! create, insert, get, update, delete, scan, and whole-chain validation.
//! A table is a linked list of leaf pages rooted at a caller-chosen page
//! number >= 1; there is no catalog, so callers must remember each
//! table's root page.

use crate::leaf;
use crate::pager::{PageNum, Pager, PAGE_SIZE};

pub use crate::leaf::Record;
pub use crate::leaf::RECORD_SIZE;

/// A record id packs `(page_number << 16) | slot_index`, limiting v1 to
/// 65536 pages. Stable while the slot remains allocated; reusable after
/// the slot is deleted and a later insert lands in the same spot.
pub type RecordId = u32;

/// One past the highest page number a record id can address: ids reserve
/// only the low 16 bits for slot index, so a page at or beyond this value
/// would collide with a lower page's ids instead of encoding uniquely.
pub const MAX_ADDRESSABLE_PAGE: PageNum = 1 << 16;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Pager(#[from] crate::pager::Error),
    #[error(transparent)]
    Leaf(#[from] leaf::Error),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("record id references a slot outside the page's capacity")]
    SlotOutOfRange,
    #[error("record id references a slot that is not currently allocated")]
    SlotNotAllocated,
    #[error("create refused to overwrite a non-empty leaf page")]
    NonEmptyPage,
    #[error("leaf page chain is structurally inconsistent")]
    Layout,
    #[error("page {0} is at or beyond the highest page a record id can address ({MAX_ADDRESSABLE_PAGE})")]
    PageAddressOverflow(PageNum),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Pager(e) => e.code(),
            Error::Leaf(e) => e.code(),
            Error::InvalidArgument => "invalid_argument",
            Error::SlotOutOfRange => "slot_out_of_range",
            Error::SlotNotAllocated => "slot_not_allocated",
            Error::NonEmptyPage => "layout",
            Error::Layout => "layout",
            Error::PageAddressOverflow(_) => "page_address_overflow",
        }
    }
}

pub fn make_id(page: PageNum, slot: u16) -> RecordId {
    (page << 16) | slot as u32
}

pub fn split_id(id: RecordId) -> (PageNum, u16) {
    (id >> 16, (id & 0xFFFF) as u16)
}

fn check_addressable(page: PageNum) -> Result<(), Error> {
    if page >= MAX_ADDRESSABLE_PAGE {
        return Err(Error::PageAddressOverflow(page));
    }
    Ok(())
}

fn zero_page() -> Vec<u8> {
    vec![0_u8; PAGE_SIZE]
}

/// Initializes `first_page_num` as the root of an empty table, allocating
/// pages up to it if the file isn't that large yet. Idempotent on a
/// page that is already an empty leaf; refuses (never overwrites) any
/// other non-zero page.
pub fn create(pager: &mut Pager, first_page_num: PageNum) -> Result<(), Error> {
    if first_page_num < 1 {
        return Err(Error::InvalidArgument);
    }
    check_addressable(first_page_num)?;
    while pager.page_count() <= first_page_num {
        pager.alloc_page()?;
    }

    let mut buf = zero_page();
    pager.read(first_page_num, &mut buf)?;

    if buf.iter().all(|&b| b == 0) {
        leaf::init_leaf(&mut buf, RECORD_SIZE as u16)?;
        leaf::validate(&buf)?;
        pager.write(first_page_num, &buf)?;
        return Ok(());
    }

    match leaf::validate(&buf) {
        Ok(()) if leaf::used_count(&buf) == 0 && leaf::next_page(&buf) == 0 => Ok(()),
        _ => Err(Error::NonEmptyPage),
    }
}

/// Walks the chain from `root`, inserting into the first slot with room.
/// Allocates and links a new page when every page in the chain is full.
/// Progress is guaranteed: every loop iteration either inserts, advances
/// along the (acyclic, by construction) chain, or appends a new page.
pub fn insert(pager: &mut Pager, root: PageNum, record: &Record) -> Result<RecordId, Error> {
    let mut page_no = root;
    loop {
        check_addressable(page_no)?;
        let mut buf = zero_page();
        pager.read(page_no, &mut buf)?;
        leaf::validate(&buf)?;

        let capacity = leaf::capacity(&buf) as usize;
        let used = leaf::used_count(&buf) as usize;

        if used < capacity {
            let slot = leaf::find_free_slot(&buf).ok_or(Error::Layout)?;
            leaf::mark_used(&mut buf, slot)?;
            let dst = leaf::slot_ptr(&mut buf, slot).ok_or(Error::Layout)?;
            dst.copy_from_slice(record);
            pager.write(page_no, &buf)?;
            return Ok(make_id(page_no, slot as u16));
        }

        let next = leaf::next_page(&buf);
        if next != 0 {
            page_no = next;
            continue;
        }

        let new_page_no = pager.alloc_page()?;
        let mut new_buf = zero_page();
        leaf::init_leaf(&mut new_buf, RECORD_SIZE as u16)?;
        pager.write(new_page_no, &new_buf)?;

        leaf::set_next_page(&mut buf, new_page_no);
        pager.write(page_no, &buf)?;
        page_no = new_page_no;
    }
}

fn read_valid_leaf_for_id(pager: &mut Pager, id: RecordId) -> Result<(Vec<u8>, u16), Error> {
    let (page_no, slot) = split_id(id);
    if page_no < 1 {
        return Err(Error::InvalidArgument);
    }
    let mut buf = zero_page();
    pager.read(page_no, &mut buf)?;
    leaf::validate(&buf)?;
    let capacity = leaf::capacity(&buf);
    if slot >= capacity {
        return Err(Error::SlotOutOfRange);
    }
    Ok((buf, slot))
}

/// Copies the 128-byte payload addressed by `id` into a fresh buffer.
pub fn get(pager: &mut Pager, id: RecordId) -> Result<Record, Error> {
    let (buf, slot) = read_valid_leaf_for_id(pager, id)?;
    if !slot_is_allocated(&buf, slot) {
        return Err(Error::SlotNotAllocated);
    }
    let src = leaf::slot_ptr_const(&buf, slot as usize).ok_or(Error::Layout)?;
    let mut out = [0_u8; RECORD_SIZE];
    out.copy_from_slice(src);
    Ok(out)
}

/// Overwrites the payload addressed by `id`. The bitmap is unchanged.
pub fn update(pager: &mut Pager, id: RecordId, record: &Record) -> Result<(), Error> {
    let (page_no, _) = split_id(id);
    let (mut buf, slot) = read_valid_leaf_for_id(pager, id)?;
    if !slot_is_allocated(&buf, slot) {
        return Err(Error::SlotNotAllocated);
    }
    let dst = leaf::slot_ptr(&mut buf, slot as usize).ok_or(Error::Layout)?;
    dst.copy_from_slice(record);
    pager.write(page_no, &buf)?;
    Ok(())
}

/// Zeroes the payload and clears the bitmap bit addressed by `id`.
pub fn delete(pager: &mut Pager, id: RecordId) -> Result<(), Error> {
    let (page_no, _) = split_id(id);
    let (mut buf, slot) = read_valid_leaf_for_id(pager, id)?;
    if !slot_is_allocated(&buf, slot) {
        return Err(Error::SlotNotAllocated);
    }
    {
        let dst = leaf::slot_ptr(&mut buf, slot as usize).ok_or(Error::Layout)?;
        dst.fill(0);
    }
    leaf::mark_free(&mut buf, slot as usize)?;
    pager.write(page_no, &buf)?;
    Ok(())
}

fn slot_is_allocated(buf: &[u8], slot: u16) -> bool {
    let byte = leaf::LEAF_HEADER_SIZE + slot as usize / 8;
    let bit = slot as usize % 8;
    buf[byte] & (1 << bit) != 0
}

/// Walks the chain rooted at `root`, invoking `callback(record, id)` for
/// each live slot in chain order, slot indices ascending within a page.
/// A non-zero callback return stops iteration immediately and is
/// propagated as the scan's result.
pub fn scan<F>(pager: &mut Pager, root: PageNum, mut callback: F) -> Result<i32, Error>
where
    F: FnMut(&Record, RecordId) -> i32,
{
    let mut page_no = root;
    loop {
        check_addressable(page_no)?;
        let mut buf = zero_page();
        pager.read(page_no, &mut buf)?;
        leaf::validate(&buf)?;

        let next = leaf::next_page(&buf);
        if next != 0 && next >= pager.page_count() {
            return Err(Error::Layout);
        }

        let capacity = leaf::capacity(&buf) as usize;
        for slot in 0..capacity {
            if slot_is_allocated(&buf, slot as u16) {
                let src = leaf::slot_ptr_const(&buf, slot).ok_or(Error::Layout)?;
                let mut record = [0_u8; RECORD_SIZE];
                record.copy_from_slice(src);
                let rc = callback(&record, make_id(page_no, slot as u16));
                if rc != 0 {
                    return Ok(rc);
                }
            }
        }

        if next == 0 {
            return Ok(0);
        }
        page_no = next;
    }
}

/// Walks the chain rooted at `root`, validating every page. A `next_page`
/// pointing at or beyond `page_count` is a layout error, as is any page
/// that fails `leaf::validate`.
pub fn validate_all(pager: &mut Pager, root: PageNum) -> Result<(), Error> {
    let mut page_no = root;
    loop {
        if page_no < 1 || page_no >= pager.page_count() {
            return Err(Error::Layout);
        }
        let mut buf = zero_page();
        pager.read(page_no, &mut buf)?;
        leaf::validate(&buf)?;

        let next = leaf::next_page(&buf);
        if next == 0 {
            return Ok(());
        }
        if next >= pager.page_count() {
            return Err(Error::Layout);
        }
        page_no = next;
    }
}
