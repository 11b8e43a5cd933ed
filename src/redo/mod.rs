//! Redo Applier: walks the `(space, page)` dispatch map produced by the
//! log reader and applies each record's physiological operator to the
//! cached page image.

pub mod operators;

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::buffer_pool::BufferPool;
use crate::device::TablespaceFiles;
use crate::error::{ErrorKind, SmallError};
use crate::log::record::RecordType;
use crate::log::LogEntry;
use crate::page;
use crate::types::{Lsn, PageId, SpaceId};

use self::operators::ApplyOutcome;

#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyStats {
    pub applied: u64,
    pub skipped_no_op: u64,
    pub skipped_by_lsn: u64,
    pub failed: u64,
}

/// Applies every record in `dispatch` to its page via `pool`, fetching
/// pages from `device` on a buffer-pool miss.
pub fn apply_dispatch(
    dispatch: &BTreeMap<SpaceId, BTreeMap<PageId, Vec<LogEntry>>>,
    checkpoint_lsn: Lsn,
    pool: &mut BufferPool,
    device: &mut TablespaceFiles,
) -> Result<ApplyStats, SmallError> {
    let mut stats = ApplyStats::default();
    for (&space, pages) in dispatch.iter() {
        for (&page_id, records) in pages.iter() {
            for entry in records.iter() {
                apply_one(entry, space, page_id, checkpoint_lsn, pool, device, &mut stats)?;
            }
        }
    }
    Ok(stats)
}

fn apply_one(
    entry: &LogEntry,
    space: SpaceId,
    page_id: PageId,
    checkpoint_lsn: Lsn,
    pool: &mut BufferPool,
    device: &mut TablespaceFiles,
    stats: &mut ApplyStats,
) -> Result<(), SmallError> {
    if entry.ty == RecordType::CompPageCreate || entry.ty == RecordType::PageCreate {
        let page = pool.create_page(space, page_id, device)?;
        let result = operators::apply_comp_page_create(page, space, page_id);
        return finish(page, entry, space, page_id, result, stats);
    }

    let existing_lsn = pool.page_lsn(space, page_id);
    let page_already_cached = existing_lsn.is_some();
    let page = pool.get(space, page_id, device)?;
    let current_lsn = page::page_lsn(page);

    if entry.lsn <= checkpoint_lsn || entry.lsn <= current_lsn {
        debug!(
            "skip record type={:?} space={} page={} lsn={} (page_lsn={}, checkpoint_lsn={})",
            entry.ty, space, page_id, entry.lsn, current_lsn, checkpoint_lsn
        );
        stats.skipped_by_lsn += 1;
        let _ = page_already_cached;
        return Ok(());
    }

    let result = dispatch_one(entry, page, space, page_id);
    finish(page, entry, space, page_id, result, stats)
}

/// Records the outcome of one operator call. A malformed record (bad
/// offset, bad compressed integer, ...) is logged and counted as a
/// failure rather than aborting the rest of the recovery pass -- the log
/// may carry other, unrelated records after it that still need applying.
fn finish(
    page: &mut [u8],
    entry: &LogEntry,
    space: SpaceId,
    page_id: PageId,
    result: Result<ApplyOutcome, SmallError>,
    stats: &mut ApplyStats,
) -> Result<(), SmallError> {
    match result {
        Ok(ApplyOutcome::Applied) => {
            page::set_page_lsn(page, entry.lsn + entry.len);
            stats.applied += 1;
            Ok(())
        }
        Ok(ApplyOutcome::Skipped) => {
            stats.skipped_no_op += 1;
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::Malformed => {
            warn!(
                "skipping malformed record type={:?} space={} page={} lsn={}: {}",
                entry.ty, space, page_id, entry.lsn, e
            );
            stats.failed += 1;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn dispatch_one(entry: &LogEntry, page: &mut [u8], space: SpaceId, page_id: PageId) -> Result<ApplyOutcome, SmallError> {
    use RecordType::*;
    let body = entry.body.as_slice();
    match entry.ty {
        Mlog1Byte => operators::apply_n_bytes(page, body, 1),
        Mlog2Bytes => operators::apply_n_bytes(page, body, 2),
        Mlog4Bytes => operators::apply_n_bytes(page, body, 4),
        Mlog8Bytes => operators::apply_n_bytes(page, body, 8),
        WriteString => operators::apply_write_string(page, body),
        InitFilePage | InitFilePage2 => operators::apply_init_file_page2(page, space, page_id),
        CompRecMinMark | RecMinMark => operators::apply_min_rec_mark(page, body),
        CompRecClustDeleteMark | RecClustDeleteMark => operators::apply_clust_delete_mark(page, body),
        CompRecSecDeleteMark | RecSecDeleteMark => operators::apply_sec_delete_mark(page, body),
        CompRecUpdateInPlace | RecUpdateInPlace => operators::apply_update_in_place(page, body),
        CompRecInsert | RecInsert => operators::apply_rec_insert(page, body),
        CompRecDelete | RecDelete => operators::apply_rec_delete(page, body),
        ListEndDelete | ListStartDelete | CompListEndDelete | CompListStartDelete => operators::apply_list_delete(body),
        PageReorganize | CompPageReorganize | ZipPageReorganize => operators::apply_page_reorganize(),
        // everything else parses successfully upstream but has no
        // defined page mutation in this crate's scope (file-space
        // metadata operations, compressed-page operations, undo-page
        // header operations, index load, truncate, ...).
        _ => Ok(ApplyOutcome::Skipped),
    }
}
