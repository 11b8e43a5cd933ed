//! Shared fixtures for the end-to-end recovery tests: a tiny log-partition
//! builder (metadata page + checkpoint + block-framed records) and a
//! scratch tablespace file.

use std::io::Write;
use std::sync::Once;

use small_redo::io::{encode_compressed_u32, write_be_u16, write_be_u64};
use small_redo::log_init;

pub const PAGE_SIZE: usize = 16384;
pub const LOG_BLOCK_SIZE: usize = 512;
pub const LOG_BLOCK_HDR_DATA_LEN: usize = 4;
pub const LOG_BLOCK_HDR_SIZE: usize = 12;
pub const LOG_BLOCK_TRL_SIZE: usize = 4;
pub const LOG_BLOCK_PAYLOAD: usize = LOG_BLOCK_SIZE - LOG_BLOCK_HDR_SIZE - LOG_BLOCK_TRL_SIZE;
pub const N_BLOCKS_IN_A_PAGE: usize = PAGE_SIZE / LOG_BLOCK_SIZE;

pub const LOG_CHECKPOINT_NO: usize = 0;
pub const LOG_CHECKPOINT_LSN: usize = 8;
pub const LOG_CHECKPOINT_1: usize = 512;

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        log_init::init_log();
    });
}

/// One not-yet-framed log record: type tag (without the single-record
/// flag; it is OR'd in automatically), optional `(space, page)` address,
/// and body bytes.
pub struct RawRecord {
    pub tag: u8,
    pub address: Option<(u32, u32)>,
    pub body: Vec<u8>,
}

impl RawRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.tag | 0x80];
        if let Some((space, page)) = self.address {
            out.extend(encode_compressed_u32(space));
            out.extend(encode_compressed_u32(page));
        }
        out.extend_from_slice(&self.body);
        out
    }
}

/// Builds a log-partition file containing one metadata page (checkpoint 1
/// selected, at `checkpoint_lsn`) followed by the given records, fully
/// flushed into 512-byte blocks starting right after the four metadata
/// blocks on page 0.
pub fn build_log_file(path: &std::path::Path, checkpoint_lsn: u64, records: &[RawRecord]) {
    let mut payload = Vec::new();
    for r in records {
        payload.extend(r.encode());
    }

    let mut page0 = vec![0u8; PAGE_SIZE];
    write_be_u64(&mut page0, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_NO, 1);
    write_be_u64(&mut page0, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_LSN, checkpoint_lsn);

    let mut block = 4;
    for chunk in payload.chunks(LOG_BLOCK_PAYLOAD.max(1)) {
        if block >= N_BLOCKS_IN_A_PAGE {
            break;
        }
        let off = block * LOG_BLOCK_SIZE;
        write_be_u16(&mut page0, off + LOG_BLOCK_HDR_DATA_LEN, LOG_BLOCK_SIZE as u16);
        page0[off + LOG_BLOCK_HDR_SIZE..off + LOG_BLOCK_HDR_SIZE + chunk.len()].copy_from_slice(chunk);
        block += 1;
    }
    if payload.is_empty() {
        // still emit one fully-flushed, empty data block so the reader
        // sees a clean end of log rather than a not-yet-written block.
        let off = 4 * LOG_BLOCK_SIZE;
        write_be_u16(&mut page0, off + LOG_BLOCK_HDR_DATA_LEN, LOG_BLOCK_SIZE as u16);
    }

    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(&page0).unwrap();
}

/// Builds a log-partition file whose only data block on page 0 is
/// deliberately short (`data_len != 512`), to exercise the truncated-tail
/// scenario: the block holds real records but was never flushed full.
pub fn build_truncated_log_file(path: &std::path::Path, checkpoint_lsn: u64, records: &[RawRecord]) {
    let mut payload = Vec::new();
    for r in records {
        payload.extend(r.encode());
    }
    assert!(payload.len() <= LOG_BLOCK_PAYLOAD, "fixture record set too large for one block");

    let mut page0 = vec![0u8; PAGE_SIZE];
    write_be_u64(&mut page0, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_NO, 1);
    write_be_u64(&mut page0, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_LSN, checkpoint_lsn);

    let off = 4 * LOG_BLOCK_SIZE;
    write_be_u16(&mut page0, off + LOG_BLOCK_HDR_DATA_LEN, payload.len() as u16);
    page0[off + LOG_BLOCK_HDR_SIZE..off + LOG_BLOCK_HDR_SIZE + payload.len()].copy_from_slice(&payload);

    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(&page0).unwrap();
}

pub fn build_empty_tablespace_file(path: &std::path::Path, n_pages: usize) {
    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; PAGE_SIZE * n_pages]).unwrap();
}
