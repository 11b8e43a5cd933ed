//! Data-page layout constants and the slotted compact-index-page record
//! accessors.
//!
//! Offsets are taken from the reference InnoDB page-format headers; see
//! `record.rs` for the record-header bit-field accessors and
//! `crate::redo::operators` for the mutating operators built on top of
//! these.

pub mod record;

use crate::io::{read_be_u16, read_be_u32, read_be_u64, write_be_u16, write_be_u32, write_be_u64};
use crate::types::PAGE_SIZE;

// -- FIL (file-page) header, common to every page type --------------------

pub const FIL_PAGE_SPACE_OR_CHKSUM: usize = 0;
pub const FIL_PAGE_OFFSET: usize = 4;
pub const FIL_PAGE_LSN: usize = 16;
pub const FIL_PAGE_TYPE: usize = 24;
pub const FIL_PAGE_ARCH_LOG_NO_OR_SPACE_ID: usize = 34;
pub const FIL_PAGE_DATA: usize = 38;
/// Size of the page trailer; `FIL_PAGE_END_LSN_OLD_CHKSUM` starts at
/// `PAGE_SIZE - FIL_PAGE_DATA_END`.
pub const FIL_PAGE_DATA_END: usize = 8;

pub const FIL_PAGE_INDEX: u16 = 17855;

// -- PAGE_HEADER (index-page header), relative to FIL_PAGE_DATA ----------

pub const PAGE_HEADER: usize = FIL_PAGE_DATA;
pub const PAGE_N_DIR_SLOTS: usize = PAGE_HEADER + 0;
pub const PAGE_HEAP_TOP: usize = PAGE_HEADER + 2;
pub const PAGE_N_HEAP: usize = PAGE_HEADER + 4;
pub const PAGE_FREE: usize = PAGE_HEADER + 6;
pub const PAGE_GARBAGE: usize = PAGE_HEADER + 8;
pub const PAGE_LAST_INSERT: usize = PAGE_HEADER + 10;
pub const PAGE_DIRECTION: usize = PAGE_HEADER + 12;
pub const PAGE_N_DIRECTION: usize = PAGE_HEADER + 14;
pub const PAGE_N_RECS: usize = PAGE_HEADER + 16;
pub const PAGE_MAX_TRX_ID: usize = PAGE_HEADER + 18;
pub const PAGE_HEADER_PRIV_END: usize = PAGE_HEADER + 26;
pub const PAGE_LEVEL: usize = PAGE_HEADER + 26;
pub const PAGE_INDEX_ID: usize = PAGE_HEADER + 28;

/// Two fseg headers (leaf + non-leaf) follow the 26 private-header bytes.
pub const FSEG_HEADER_SIZE: usize = 10;
pub const PAGE_DATA: usize = PAGE_HEADER + 36 + 2 * FSEG_HEADER_SIZE;

pub const PAGE_NEW_INFIMUM: usize = PAGE_DATA + 5;
pub const PAGE_NEW_SUPREMUM: usize = PAGE_DATA + 2 * 5 + 8;
pub const PAGE_NEW_SUPREMUM_END: usize = PAGE_NEW_SUPREMUM + 8;

pub const PAGE_DIR_SLOT_SIZE: usize = 2;
pub const PAGE_DIR_SLOT_MAX_N_OWNED: u8 = 8;
pub const PAGE_DIR_SLOT_MIN_N_OWNED: u8 = 4;
pub const PAGE_HEAP_NO_USER_LOW: u16 = 2;
pub const PAGE_HEAP_NO_INFIMUM: u16 = 0;
pub const PAGE_HEAP_NO_SUPREMUM: u16 = 1;

pub const PAGE_NO_DIRECTION: u16 = 5;

/// The fixed 26-byte infimum/supremum pair InnoDB writes on every freshly
/// created compact index page. `infimum` occupies bytes `[0..13)`,
/// `supremum` occupies `[13..26)`. Each record's 5-byte header sits
/// immediately before its data bytes; the header layout matches
/// `record::set_next_offset` et al. so these bytes can be read back with
/// the ordinary accessors.
pub const INFIMUM_SUPREMUM_COMPACT: [u8; 26] = [
    // infimum: n_owned=1, heap_no=0 (infimum), status=2 (infimum), next=13
    0x01, 0x00, 0x02, 0x00, 0x0D, b'i', b'n', b'f', b'i', b'm', b'u', b'm', 0x00,
    // supremum: n_owned=1, heap_no=1, status=3 (supremum), next=0
    0x01, 0x00, 0x0B, 0x00, 0x00, b's', b'u', b'p', b'r', b'e', b'm', b'u', b'm',
];

/// One 16 KiB page image.
pub type PageBytes = [u8; PAGE_SIZE];

pub fn new_zero_page() -> Box<PageBytes> {
    Box::new([0u8; PAGE_SIZE])
}

pub fn page_lsn(page: &[u8]) -> u64 {
    read_be_u64(page, FIL_PAGE_LSN)
}

pub fn set_page_lsn(page: &mut [u8], lsn: u64) {
    write_be_u64(page, FIL_PAGE_LSN, lsn);
    // mirror the low 4 bytes of LSN into the trailer, set a sentinel
    // checksum in the high 4 bytes (this crate does not implement the
    // real CRC; a fixed sentinel makes "has this page been touched" and
    // "does the trailer agree with the header" checkable in tests).
    let trailer_off = PAGE_SIZE - FIL_PAGE_DATA_END;
    write_be_u32(page, trailer_off, 0xDEAD_BEEF);
    write_be_u32(page, trailer_off + 4, (lsn & 0xFFFF_FFFF) as u32);
}

pub fn page_id(page: &[u8]) -> u32 {
    read_be_u32(page, FIL_PAGE_OFFSET)
}

pub fn space_id(page: &[u8]) -> u32 {
    read_be_u32(page, FIL_PAGE_ARCH_LOG_NO_OR_SPACE_ID)
}

pub fn page_type(page: &[u8]) -> u16 {
    read_be_u16(page, FIL_PAGE_TYPE)
}

pub fn set_page_type(page: &mut [u8], t: u16) {
    write_be_u16(page, FIL_PAGE_TYPE, t);
}

pub fn n_heap(page: &[u8]) -> u16 {
    read_be_u16(page, PAGE_N_HEAP) & 0x7FFF
}

pub fn set_n_heap(page: &mut [u8], n: u16) {
    // high bit marks "new" (compact) record format; always set for this crate.
    write_be_u16(page, PAGE_N_HEAP, n | 0x8000);
}

pub fn heap_top(page: &[u8]) -> u16 {
    read_be_u16(page, PAGE_HEAP_TOP)
}

pub fn set_heap_top(page: &mut [u8], off: u16) {
    write_be_u16(page, PAGE_HEAP_TOP, off);
}

pub fn n_dir_slots(page: &[u8]) -> u16 {
    read_be_u16(page, PAGE_N_DIR_SLOTS)
}

pub fn set_n_dir_slots(page: &mut [u8], n: u16) {
    write_be_u16(page, PAGE_N_DIR_SLOTS, n);
}

pub fn n_recs(page: &[u8]) -> u16 {
    read_be_u16(page, PAGE_N_RECS)
}

pub fn set_n_recs(page: &mut [u8], n: u16) {
    write_be_u16(page, PAGE_N_RECS, n);
}

/// Byte offset, relative to the page start, of directory slot `i` (slot 0
/// is the supremum's slot and sits immediately before the trailer).
pub fn dir_slot_offset(i: u16) -> usize {
    PAGE_SIZE - FIL_PAGE_DATA_END - (i as usize + 1) * PAGE_DIR_SLOT_SIZE
}

pub fn dir_slot(page: &[u8], i: u16) -> u16 {
    read_be_u16(page, dir_slot_offset(i))
}

pub fn set_dir_slot(page: &mut [u8], i: u16, rec_offset: u16) {
    write_be_u16(page, dir_slot_offset(i), rec_offset);
}

/// Initializes a page's `FIL` header (type, space, page-id) and the
/// `PAGE_HEADER` private fields -- used by `MLOG_INIT_FILE_PAGE2` and as the
/// first step of `MLOG_COMP_PAGE_CREATE`.
pub fn init_fil_header(page: &mut [u8], space: u32, page_no: u32) {
    for b in page.iter_mut() {
        *b = 0;
    }
    write_be_u32(page, FIL_PAGE_OFFSET, page_no);
    write_be_u32(page, FIL_PAGE_ARCH_LOG_NO_OR_SPACE_ID, space);
}

/// Writes the fresh-compact-index-page layout: zeroed private header,
/// two-slot directory (infimum + supremum), and the fixed infimum/supremum
/// record pair. Matches `MLOG_COMP_PAGE_CREATE`'s body in
/// `crate::redo::operators`.
pub fn init_compact_index_page(page: &mut [u8]) {
    for b in page[PAGE_HEADER..PAGE_HEADER_PRIV_END].iter_mut() {
        *b = 0;
    }
    set_page_type(page, FIL_PAGE_INDEX);
    set_n_dir_slots(page, 2);
    write_be_u16(page, PAGE_DIRECTION, PAGE_NO_DIRECTION);
    set_n_heap(page, PAGE_HEAP_NO_USER_LOW);
    set_n_recs(page, 0);
    set_heap_top(page, PAGE_NEW_SUPREMUM_END as u16);

    page[PAGE_DATA..PAGE_DATA + 26].copy_from_slice(&INFIMUM_SUPREMUM_COMPACT);

    set_dir_slot(page, 0, PAGE_NEW_INFIMUM as u16);
    set_dir_slot(page, 1, PAGE_NEW_SUPREMUM as u16);
}
