//! Per-type physiological redo operators.
//!
//! Each operator receives the raw page bytes and the record's body bytes
//! (as captured by the log parser) and mutates the page in place. Parsing
//! in `crate::log::record` only validates and advances past a body; these
//! operators re-walk the same bytes to pull out the fields they need to
//! apply, per the "parsers are pure, appliers reparse" design note.

use log::warn;

use crate::error::SmallError;
use crate::io::Cursor;
use crate::page::{self, record as rec};
use crate::types::{PageId, SpaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Intentionally a no-op (matches a documented open question), or a
    /// redundant/out-of-scope variant that parses but never mutates.
    Skipped,
}

pub fn apply_n_bytes(page: &mut [u8], body: &[u8], width: usize) -> Result<ApplyOutcome, SmallError> {
    let mut cur = Cursor::new(body);
    let offset = cur.read_u16()? as usize;
    let value = if width == 8 {
        cur.read_compressed_u64()?
    } else {
        cur.read_compressed_u32()? as u64
    };
    if offset + width > page.len() {
        return Err(SmallError::malformed("n-byte write offset out of page bounds"));
    }
    match width {
        1 => page[offset] = value as u8,
        2 => crate::io::write_be_u16(page, offset, value as u16),
        4 => crate::io::write_be_u32(page, offset, value as u32),
        8 => crate::io::write_be_u64(page, offset, value),
        _ => unreachable!(),
    }
    Ok(ApplyOutcome::Applied)
}

pub fn apply_write_string(page: &mut [u8], body: &[u8]) -> Result<ApplyOutcome, SmallError> {
    let mut cur = Cursor::new(body);
    let offset = cur.read_u16()? as usize;
    let len = cur.read_u16()? as usize;
    let bytes = cur.take(len)?;
    if offset + len > page.len() {
        return Err(SmallError::malformed("write-string range out of page bounds"));
    }
    page[offset..offset + len].copy_from_slice(bytes);
    Ok(ApplyOutcome::Applied)
}

pub fn apply_init_file_page2(page: &mut [u8], space: SpaceId, page_no: PageId) -> Result<ApplyOutcome, SmallError> {
    page::init_fil_header(page, space, page_no);
    Ok(ApplyOutcome::Applied)
}

pub fn apply_comp_page_create(page: &mut [u8], space: SpaceId, page_no: PageId) -> Result<ApplyOutcome, SmallError> {
    page::init_fil_header(page, space, page_no);
    page::init_compact_index_page(page);
    Ok(ApplyOutcome::Applied)
}

fn read_mark_offset(body: &[u8]) -> Result<usize, SmallError> {
    let mut cur = Cursor::new(body);
    Ok(cur.read_u16()? as usize)
}

pub fn apply_min_rec_mark(page: &mut [u8], body: &[u8]) -> Result<ApplyOutcome, SmallError> {
    let rec_off = read_mark_offset(body)?;
    rec::set_min_rec_flag(page, rec_off);
    Ok(ApplyOutcome::Applied)
}

pub fn apply_sec_delete_mark(page: &mut [u8], body: &[u8]) -> Result<ApplyOutcome, SmallError> {
    let rec_off = read_mark_offset(body)?;
    rec::set_deleted_flag(page, rec_off, true);
    Ok(ApplyOutcome::Applied)
}

/// Set on a delete-mark's `flags` field when the caller has already placed
/// the correct `DATA_TRX_ID`/`DATA_ROLL_PTR` bytes in the record -- the
/// operator should leave the system columns alone and touch only the
/// deleted flag.
const BTR_KEEP_SYS_FLAG: u16 = 4;

/// Clustered delete-mark body layout: `flags(u16) || trx_id col pos(u16) ||
/// compressed trx_id || roll_ptr len marker(u8) || roll_ptr(7 bytes) ||
/// record offset(u16)`. Unless `BTR_KEEP_SYS_FLAG` is set, `DATA_TRX_ID`
/// (6 bytes) and `DATA_ROLL_PTR` (7 bytes) are rewritten back-to-back
/// starting at `rec_off + trx_id_col_pos`, matching the column order
/// every clustered index carries its system columns in.
pub fn apply_clust_delete_mark(page: &mut [u8], body: &[u8]) -> Result<ApplyOutcome, SmallError> {
    let mut cur = Cursor::new(body);
    let flags = cur.read_u16()?;
    let trx_id_col_pos = cur.read_u16()? as usize;
    let trx_id = cur.read_compressed_u64()?;
    cur.read_u8()?; // roll ptr length marker
    let roll_ptr = cur.take(7)?;
    let rec_off = cur.read_u16()? as usize;

    rec::set_deleted_flag(page, rec_off, flags != 0);

    if flags & BTR_KEEP_SYS_FLAG == 0 {
        let trx_id_dst = rec_off + trx_id_col_pos;
        let roll_ptr_dst = trx_id_dst + rec::DATA_TRX_ID_LEN;
        if roll_ptr_dst + rec::DATA_ROLL_PTR_LEN > page.len() {
            return Err(SmallError::malformed("delete-mark system column write out of page bounds"));
        }
        let trx_id_bytes = trx_id.to_be_bytes();
        page[trx_id_dst..trx_id_dst + rec::DATA_TRX_ID_LEN].copy_from_slice(&trx_id_bytes[8 - rec::DATA_TRX_ID_LEN..]);
        page[roll_ptr_dst..roll_ptr_dst + rec::DATA_ROLL_PTR_LEN].copy_from_slice(roll_ptr);
    }

    Ok(ApplyOutcome::Applied)
}

/// Update-in-place body: `info_bits(u8) || trx id col pos(u16) ||
/// compressed trx_id || roll_ptr marker(u8) || roll_ptr(7) ||
/// record offset(u16) || n_fields(u16) || n_fields * (field_no, len,
/// bytes)`.
///
/// Resolving `field_no` to a byte range inside the record in general
/// requires the index's nullable-bitmap/variable-length-vector layout,
/// which in turn requires the schema catalog this crate does not carry.
/// For the fixed-width-column case -- the common case, and the one this
/// crate's own inserts produce -- `field_no` already equals the column's
/// byte offset from the record origin, and is applied directly as such.
pub fn apply_update_in_place(page: &mut [u8], body: &[u8]) -> Result<ApplyOutcome, SmallError> {
    let mut cur = Cursor::new(body);
    let info_bits = cur.read_u8()?;
    cur.read_u16()?;
    cur.read_compressed_u64()?;
    cur.read_u8()?;
    cur.take(7)?;
    let rec_off = cur.read_u16()? as usize;
    rec::set_info_bits(page, rec_off, info_bits);
    let n_fields = cur.read_u16()?;
    for _ in 0..n_fields {
        let field_offset = cur.read_compressed_u32()? as usize;
        let len = cur.read_compressed_u32()?;
        if len == u32::MAX {
            continue; // SQL NULL, nothing to overwrite
        }
        let bytes = cur.take(len as usize)?;
        let dst = rec_off + field_offset;
        if dst + bytes.len() > page.len() {
            return Err(SmallError::malformed("update-in-place field out of page bounds"));
        }
        page[dst..dst + bytes.len()].copy_from_slice(bytes);
    }
    Ok(ApplyOutcome::Applied)
}

/// `MLOG_COMP_REC_DELETE`: parses (and bounds-checks) the target record
/// offset but performs no mutation. Intentional no-op -- see the module
/// docs in `crate::redo`.
pub fn apply_rec_delete(page: &[u8], body: &[u8]) -> Result<ApplyOutcome, SmallError> {
    let rec_off = read_mark_offset(body)?;
    if rec_off >= page.len() {
        return Err(SmallError::malformed("delete target out of page bounds"));
    }
    warn!("MLOG_COMP_REC_DELETE reached for offset {}; delete is a documented no-op", rec_off);
    Ok(ApplyOutcome::Skipped)
}

/// `MLOG_LIST_*_DELETE` / `MLOG_COMP_LIST_*_DELETE`: parses the boundary
/// offset but performs no mutation. Intentional no-op.
pub fn apply_list_delete(body: &[u8]) -> Result<ApplyOutcome, SmallError> {
    read_mark_offset(body)?;
    warn!("list-delete record reached; list deletion is a documented no-op");
    Ok(ApplyOutcome::Skipped)
}

/// `MLOG_PAGE_REORGANIZE` / `MLOG_COMP_PAGE_REORGANIZE`: parses
/// successfully but never reorganizes the page. Intentional no-op.
pub fn apply_page_reorganize() -> Result<ApplyOutcome, SmallError> {
    warn!("page-reorganize record reached; reorganize is a documented no-op");
    Ok(ApplyOutcome::Skipped)
}

/// Fields extracted from a `MLOG_COMP_REC_INSERT` body needed to splice a
/// new record into the page.
struct InsertFields<'a> {
    cursor_offset: u16,
    info_bits: u8,
    /// Count of leading bytes the new record shares with the cursor record;
    /// `0` when the body carries the new record's bytes in full.
    mismatch_index: u16,
    /// The record's own bytes: the complete record when `mismatch_index`
    /// is `0`, otherwise just the bytes past the shared prefix.
    suffix: &'a [u8],
}

fn parse_insert_fields(body: &[u8]) -> Result<InsertFields, SmallError> {
    let mut cur = Cursor::new(body);
    let n_fields = cur.read_u16()?;
    let _n_unique = cur.read_u16()?;
    for _ in 0..n_fields {
        cur.read_u16()?;
    }
    let cursor_offset = cur.read_u16()?;
    let end_seg_len = cur.read_compressed_u32()?;
    let (info_bits, mismatch_index) = if end_seg_len & 1 != 0 {
        let bits = cur.read_u8()?;
        cur.read_u16()?; // origin_offset: this crate's records carry a fixed 5-byte header, so the shared prefix always starts at the record's own origin
        let mismatch_index = cur.read_u16()?;
        (bits, mismatch_index)
    } else {
        (0, 0)
    };
    let suffix_len = (end_seg_len >> 1) as usize;
    let suffix = cur.take(suffix_len)?;
    Ok(InsertFields {
        cursor_offset,
        info_bits,
        mismatch_index,
        suffix,
    })
}

/// Splices a new compact record into the page immediately after the
/// cursor record, updating the heap, directory slots, and owner counts.
///
/// When `mismatch_index` is nonzero the body only carries the bytes past
/// the shared prefix; the leading `mismatch_index` bytes are copied back
/// from the cursor record's own bytes (header fields among them are
/// overwritten below regardless, so copying them along is harmless).
pub fn apply_rec_insert(page: &mut [u8], body: &[u8]) -> Result<ApplyOutcome, SmallError> {
    let fields = parse_insert_fields(body)?;

    let rec_bytes: Vec<u8> = if fields.mismatch_index > 0 {
        let cursor_origin = fields.cursor_offset as usize;
        let cursor_rec_start = cursor_origin
            .checked_sub(rec::REC_N_NEW_EXTRA_BYTES)
            .ok_or_else(|| SmallError::malformed("cursor record header underflows page"))?;
        let mismatch = fields.mismatch_index as usize;
        if cursor_rec_start + mismatch > page.len() {
            return Err(SmallError::malformed("mismatch_index runs past cursor record"));
        }
        let mut rebuilt = page[cursor_rec_start..cursor_rec_start + mismatch].to_vec();
        rebuilt.extend_from_slice(fields.suffix);
        rebuilt
    } else {
        fields.suffix.to_vec()
    };

    if rec_bytes.len() < rec::REC_N_NEW_EXTRA_BYTES {
        return Err(SmallError::malformed("insert record shorter than its header"));
    }

    let heap_top = page::heap_top(page) as usize;
    let new_len = rec_bytes.len();
    let trailer_limit = page.len() - page::FIL_PAGE_DATA_END - (page::n_dir_slots(page) as usize + 1) * page::PAGE_DIR_SLOT_SIZE;
    if heap_top + new_len > trailer_limit {
        return Err(SmallError::malformed("insert does not fit in remaining page space"));
    }

    page[heap_top..heap_top + new_len].copy_from_slice(&rec_bytes);
    let origin = heap_top + rec::REC_N_NEW_EXTRA_BYTES;

    let heap_no = page::n_heap(page);
    rec::set_heap_no(page, origin, heap_no);
    rec::set_n_owned(page, origin, 0);
    rec::set_status(page, origin, rec::REC_STATUS_ORDINARY);
    rec::set_info_bits(page, origin, fields.info_bits);

    let cursor_offset = fields.cursor_offset as usize;
    let old_next = rec::next_offset(cursor_offset as u16, page);
    match old_next {
        Some(next_abs) => {
            let delta = next_abs as i32 - origin as i32;
            rec::set_next_offset_delta(page, origin, delta as i16);
        }
        None => rec::set_next_offset_delta(page, origin, 0),
    }
    let delta_from_cursor = origin as i32 - cursor_offset as i32;
    rec::set_next_offset_delta(page, cursor_offset, delta_from_cursor as i16);

    page::set_heap_top(page, (heap_top + new_len) as u16);
    page::set_n_heap(page, heap_no + 1);
    page::set_n_recs(page, page::n_recs(page) + 1);

    grow_owner_slot(page, origin as u16);

    Ok(ApplyOutcome::Applied)
}

/// Walks forward from a freshly spliced-in record to the directory slot
/// that owns it and grows that slot's owned count by one, splitting the
/// slot first if growing it in place would exceed
/// `PAGE_DIR_SLOT_MAX_N_OWNED`.
fn grow_owner_slot(page: &mut [u8], new_rec: u16) {
    let mut cur_off = new_rec;
    let owner = loop {
        match rec::next_offset(cur_off, page) {
            Some(next) => {
                cur_off = next;
                if rec::n_owned(page, cur_off as usize) > 0 {
                    break cur_off;
                }
            }
            None => return,
        }
    };

    let owned = rec::n_owned(page, owner as usize);
    if owned + 1 > page::PAGE_DIR_SLOT_MAX_N_OWNED {
        split_owner_slot(page, owner);
    } else {
        rec::set_n_owned(page, owner as usize, owned + 1);
    }
}

/// Splits the directory slot owning `owner` in two: the first half of its
/// owned records (starting right after the previous slot's owner) gets a
/// new slot inserted immediately before this one; the rest, including the
/// record that triggered the split, stays with `owner`'s existing slot.
/// Never leaves either half below `PAGE_DIR_SLOT_MIN_N_OWNED`.
fn split_owner_slot(page: &mut [u8], owner: u16) {
    let n_slots = page::n_dir_slots(page);
    let slot_index = (0..n_slots).find(|&i| page::dir_slot(page, i) == owner);
    let slot_index = match slot_index {
        Some(i) => i,
        None => {
            warn!("owner record at offset {} has no directory slot; skipping owner-slot split", owner);
            return;
        }
    };

    let group_start = if slot_index == 0 {
        page::PAGE_NEW_INFIMUM as u16
    } else {
        let prev_owner = page::dir_slot(page, slot_index - 1);
        match rec::next_offset(prev_owner, page) {
            Some(off) => off,
            None => return,
        }
    };

    let mut members = Vec::new();
    let mut off = group_start;
    loop {
        members.push(off);
        if off == owner {
            break;
        }
        match rec::next_offset(off, page) {
            Some(next) => off = next,
            None => return,
        }
    }

    let total = members.len() as u8;
    let first_half = total / 2;
    if first_half < page::PAGE_DIR_SLOT_MIN_N_OWNED || total - first_half < page::PAGE_DIR_SLOT_MIN_N_OWNED {
        // too few members to split without dropping either half below the
        // minimum; let this slot's owned count grow past the soft maximum.
        rec::set_n_owned(page, owner as usize, total);
        return;
    }

    let new_owner = members[(first_half - 1) as usize];

    for i in (slot_index..n_slots).rev() {
        let v = page::dir_slot(page, i);
        page::set_dir_slot(page, i + 1, v);
    }
    page::set_dir_slot(page, slot_index, new_owner);
    page::set_n_dir_slots(page, n_slots + 1);

    rec::set_n_owned(page, new_owner as usize, first_half);
    rec::set_n_owned(page, owner as usize, total - first_half);
}
