//! Log Reader & Parser: checkpoint selection, block de-framing, and
//! record decoding into a per-page dispatch map.

pub mod record;

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::device::FileBlockDevice;
use crate::error::{ErrorKind, SmallError};
use crate::io::{read_be_u16, read_be_u64, Cursor};
use crate::types::{Lsn, PageId, SpaceId, LOG_BLOCK_SIZE, PAGE_SIZE};

use self::record::{parse_body, RecordType, MLOG_SINGLE_REC_FLAG};

pub const LOG_BLOCK_HDR_NO: usize = 0;
pub const LOG_BLOCK_FLUSH_BIT_MASK: u32 = 0x8000_0000;
pub const LOG_BLOCK_HDR_DATA_LEN: usize = 4;
pub const LOG_BLOCK_FIRST_REC_GROUP: usize = 6;
pub const LOG_BLOCK_CHECKPOINT_NO: usize = 8;
pub const LOG_BLOCK_HDR_SIZE: usize = 12;
pub const LOG_BLOCK_TRL_SIZE: usize = 4;
pub const LOG_BLOCK_PAYLOAD_SIZE: usize = LOG_BLOCK_SIZE - LOG_BLOCK_HDR_SIZE - LOG_BLOCK_TRL_SIZE;

pub const LOG_CHECKPOINT_NO: usize = 0;
pub const LOG_CHECKPOINT_LSN: usize = 8;
pub const LOG_CHECKPOINT_OFFSET: usize = 16;
pub const LOG_CHECKPOINT_1: usize = 512;
pub const LOG_CHECKPOINT_2: usize = 1536;

/// First LSN of the first real data block (four metadata blocks precede
/// it on page 0 of the log partition).
pub const LOG_START_LSN: u64 = (4 * LOG_BLOCK_SIZE) as u64;

/// Default size of one half of the double parse buffer.
pub const DEFAULT_PARSE_BUFFER_HALF_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    pub number: u64,
    pub lsn: Lsn,
    pub offset: u64,
}

/// One decoded log record, with an owned copy of its body bytes so it can
/// outlive the parse-buffer rotation that produced it.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub ty: RecordType,
    pub space: SpaceId,
    pub page: PageId,
    pub lsn: Lsn,
    pub len: u64,
    pub body: Vec<u8>,
}

pub struct ParseProgress {
    pub records_emitted: usize,
    pub at_end_of_log: bool,
    pub dispatch: BTreeMap<SpaceId, BTreeMap<PageId, Vec<LogEntry>>>,
}

/// Reads log pages from the underlying device, strips block framing, and
/// decodes records into a dispatch map keyed by `(space, page)`.
pub struct LogReader {
    device: FileBlockDevice,
    checkpoint: Checkpoint,
    next_lsn: Lsn,
    /// cumulative logical (de-framed) bytes consumed since the checkpoint;
    /// used to compute how many block boundaries a record's length has
    /// crossed (see `advance_lsn`).
    logical_bytes_consumed: u64,
    /// next log-partition page index to read.
    next_log_page: u32,
    /// next block index to read within `next_log_page`; persisted across
    /// `fill` calls so a page that stops early on a not-yet-flushed block
    /// is not rescanned from its first block on the next call.
    next_block: usize,
    parse_buf_half: usize,
    tail: Vec<u8>,
    finished: bool,
}

impl LogReader {
    pub fn open(mut device: FileBlockDevice, parse_buf_half: usize) -> Result<Self, SmallError> {
        let checkpoint = Self::select_checkpoint(&mut device)?;
        info!(
            "selected checkpoint no={} lsn={} offset={}",
            checkpoint.number, checkpoint.lsn, checkpoint.offset
        );
        Ok(LogReader {
            device,
            next_lsn: checkpoint.lsn,
            checkpoint,
            logical_bytes_consumed: 0,
            next_log_page: 0,
            next_block: 4,
            parse_buf_half,
            tail: Vec::new(),
            finished: false,
        })
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    fn select_checkpoint(device: &mut FileBlockDevice) -> Result<Checkpoint, SmallError> {
        let mut page = vec![0u8; PAGE_SIZE];
        device.read(0, &mut page)?;
        let cp1 = Checkpoint {
            number: read_be_u64(&page, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_NO),
            lsn: read_be_u64(&page, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_LSN),
            offset: read_be_u64(&page, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_OFFSET),
        };
        let cp2 = Checkpoint {
            number: read_be_u64(&page, LOG_CHECKPOINT_2 + LOG_CHECKPOINT_NO),
            lsn: read_be_u64(&page, LOG_CHECKPOINT_2 + LOG_CHECKPOINT_LSN),
            offset: read_be_u64(&page, LOG_CHECKPOINT_2 + LOG_CHECKPOINT_OFFSET),
        };
        Ok(if cp1.number >= cp2.number { cp1 } else { cp2 })
    }

    /// Advances `next_lsn` by `len` logical bytes, adding the block
    /// framing overhead for every 512-byte boundary crossed.
    fn advance_lsn(&mut self, len: u64) {
        let before = self.logical_bytes_consumed;
        let after = before + len;
        let payload = LOG_BLOCK_PAYLOAD_SIZE as u64;
        let blocks_before = if before == 0 { 0 } else { (before - 1) / payload };
        let blocks_after = if after == 0 { 0 } else { (after - 1) / payload };
        let crossed = blocks_after - blocks_before;
        self.next_lsn += len + crossed * (LOG_BLOCK_HDR_SIZE + LOG_BLOCK_TRL_SIZE) as u64;
        self.logical_bytes_consumed = after;
    }

    /// Reads de-framed block payloads into `buf` (up to `self.parse_buf_half`
    /// bytes), skipping the first four metadata blocks of page 0. Returns
    /// `true` if it hit a not-yet-flushed block (`data_len != 512`) and had
    /// to stop early; `self.next_block` is left pointing at that block so a
    /// later call resumes there instead of rescanning the page from its
    /// first block.
    fn fill(&mut self, buf: &mut Vec<u8>) -> Result<bool, SmallError> {
        let mut page = vec![0u8; PAGE_SIZE];
        while buf.len() < self.parse_buf_half {
            if self.device.read(self.next_log_page as u64, &mut page).is_err() {
                self.finished = true;
                return Ok(true);
            }
            while self.next_block < crate::types::N_BLOCKS_IN_A_PAGE {
                let off = self.next_block * LOG_BLOCK_SIZE;
                let data_len = read_be_u16(&page, off + LOG_BLOCK_HDR_DATA_LEN) as usize;
                if data_len != LOG_BLOCK_SIZE {
                    return Ok(true);
                }
                let payload = &page[off + LOG_BLOCK_HDR_SIZE..off + LOG_BLOCK_SIZE - LOG_BLOCK_TRL_SIZE];
                buf.extend_from_slice(payload);
                self.next_block += 1;
                if buf.len() >= self.parse_buf_half {
                    break;
                }
            }
            if self.next_block >= crate::types::N_BLOCKS_IN_A_PAGE {
                self.next_log_page += 1;
                self.next_block = 0;
            }
        }
        Ok(false)
    }

    /// Runs one parse pass: fills the active parse-buffer half, decodes as
    /// many records as possible, carries the undecoded tail forward, and
    /// returns the dispatch map of newly decoded records.
    pub fn parse_pass(&mut self) -> Result<ParseProgress, SmallError> {
        let mut buf = std::mem::take(&mut self.tail);
        let truncated = if self.finished {
            true
        } else {
            self.fill(&mut buf)?
        };

        let mut dispatch: BTreeMap<SpaceId, BTreeMap<PageId, Vec<LogEntry>>> = BTreeMap::new();
        let mut consumed = 0usize;
        let mut count = 0usize;

        loop {
            let slice = &buf[consumed..];
            match self.try_parse_one(slice) {
                Ok(Some((entry, advanced))) => {
                    consumed += advanced;
                    self.advance_lsn(entry.len);
                    dispatch
                        .entry(entry.space)
                        .or_default()
                        .entry(entry.page)
                        .or_default()
                        .push(entry);
                    count += 1;
                }
                Ok(None) => break,
                Err(e) if e.kind() == ErrorKind::Truncated => {
                    // not enough buffered bytes to finish this record --
                    // leave it in the tail and retry once a later fill()
                    // hands over more bytes (or, if none are coming,
                    // `at_end_of_log` below reports we're done).
                    break;
                }
                Err(e) => {
                    // a malformed record (bad type tag, out-of-range
                    // compressed integer, ...). There is no reliable way to
                    // know how many bytes it occupied, so resync one byte
                    // at a time rather than abandoning the rest of the log;
                    // `consumed` strictly advances, so this always
                    // terminates within the buffered slice.
                    warn!("skipping unparseable byte at buffer offset {}: {}", consumed, e);
                    consumed += 1;
                }
            }
        }

        self.tail = buf[consumed..].to_vec();
        debug!("parse pass: {} records decoded, {} bytes carried over", count, self.tail.len());

        Ok(ParseProgress {
            records_emitted: count,
            at_end_of_log: truncated && count == 0,
            dispatch,
        })
    }

    /// Attempts to decode one record from the front of `slice`. Returns
    /// `Ok(None)` if there are not enough bytes buffered for even a type
    /// byte (benign end-of-buffer, not an error); otherwise the decoded
    /// entry (with an owned copy of its body bytes) and the number of
    /// bytes consumed from `slice`.
    fn try_parse_one(&self, slice: &[u8]) -> Result<Option<(LogEntry, usize)>, SmallError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let mut cur = Cursor::new(slice);
        let raw_ty = match cur.read_u8() {
            Ok(b) => b,
            Err(_) => return Ok(None),
        };
        let tag = raw_ty & !MLOG_SINGLE_REC_FLAG;
        let ty = match RecordType::from_tag(tag) {
            Some(t) => t,
            None => return Err(SmallError::malformed(format!("unknown record type tag {}", tag))),
        };

        let (space, page) = if ty.has_page_address() {
            let s = cur.read_compressed_u32()?;
            let p = cur.read_compressed_u32()?;
            (s, p)
        } else {
            (0, 0)
        };

        let body_start_pos = cur.position();
        parse_body(ty, &mut cur)?;
        let end_pos = cur.position();
        let body = slice[body_start_pos..end_pos].to_vec();

        Ok(Some((
            LogEntry {
                ty,
                space,
                page,
                lsn: self.next_lsn,
                len: end_pos as u64,
                body,
            },
            end_pos,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::write_be_u16;
    use std::io::{Seek, SeekFrom, Write as _};

    fn write_block_header(page: &mut [u8], block: usize, data_len: u16, checkpoint_no: u32) {
        let off = block * LOG_BLOCK_SIZE;
        write_be_u16(page, off + LOG_BLOCK_HDR_DATA_LEN, data_len);
        crate::io::write_be_u32(page, off + LOG_BLOCK_CHECKPOINT_NO, checkpoint_no);
    }

    fn build_log_file(dir: &std::path::Path, checkpoint_lsn: u64, checkpoint_no: u64) -> std::path::PathBuf {
        let path = dir.join("log.dat");
        let mut page0 = vec![0u8; PAGE_SIZE];
        crate::io::write_be_u64(&mut page0, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_NO, checkpoint_no);
        crate::io::write_be_u64(&mut page0, LOG_CHECKPOINT_1 + LOG_CHECKPOINT_LSN, checkpoint_lsn);
        crate::io::write_be_u64(&mut page0, LOG_CHECKPOINT_2 + LOG_CHECKPOINT_NO, 0);
        for b in 4..crate::types::N_BLOCKS_IN_A_PAGE {
            write_block_header(&mut page0, b, LOG_BLOCK_SIZE as u16, checkpoint_no as u32);
        }
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&page0).unwrap();
        path
    }

    #[test]
    fn picks_higher_checkpoint_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_log_file(dir.path(), 2048, 7);
        let dev = FileBlockDevice::open(&path).unwrap();
        let reader = LogReader::open(dev, DEFAULT_PARSE_BUFFER_HALF_SIZE).unwrap();
        assert_eq!(reader.checkpoint().number, 7);
        assert_eq!(reader.checkpoint().lsn, 2048);
    }

    #[test]
    fn empty_data_region_yields_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_log_file(dir.path(), LOG_START_LSN, 1);
        let dev = FileBlockDevice::open(&path).unwrap();
        let mut reader = LogReader::open(dev, DEFAULT_PARSE_BUFFER_HALF_SIZE).unwrap();
        let progress = reader.parse_pass().unwrap();
        assert_eq!(progress.records_emitted, 0);
    }

    #[test]
    fn malformed_record_is_skipped_without_aborting_the_rest_of_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_log_file(dir.path(), LOG_START_LSN, 1);

        // one unparseable byte (unknown type tag) followed by a valid
        // MLOG_1BYTE record for (space 0, page 0).
        let mut payload = vec![0xFFu8];
        payload.push(0x81); // MLOG_1BYTE | single-rec flag
        payload.push(0); // space, compressed
        payload.push(0); // page, compressed
        payload.extend(10u16.to_be_bytes()); // offset
        payload.push(5); // compressed value

        let mut f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.seek(SeekFrom::Start((4 * LOG_BLOCK_SIZE + LOG_BLOCK_HDR_SIZE) as u64)).unwrap();
        f.write_all(&payload).unwrap();

        let dev = FileBlockDevice::open(&path).unwrap();
        let mut reader = LogReader::open(dev, DEFAULT_PARSE_BUFFER_HALF_SIZE).unwrap();
        let progress = reader.parse_pass().unwrap();

        assert_eq!(progress.records_emitted, 1);
        let entries = &progress.dispatch[&0][&0];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ty, RecordType::Mlog1Byte);
    }
}
