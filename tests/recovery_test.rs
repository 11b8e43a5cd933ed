//! End-to-end recovery scenarios: a synthetic log partition and a scratch
//! tablespace file are built by hand, then driven through
//! `RecoverySystem::open`/`run` exactly as the CLI entry point does.

mod common;

use std::io::{Read, Seek, SeekFrom, Write};

use small_redo::io::{encode_compressed_u32, encode_compressed_u64};
use small_redo::RecoveryConfig;

use common::RawRecord;

const SPACE: u32 = 7;
const FIL_PAGE_LSN: usize = 16;

fn n_byte_body(offset: u16, value: u64, width: usize) -> Vec<u8> {
    let mut body = offset.to_be_bytes().to_vec();
    if width == 8 {
        body.extend(encode_compressed_u64(value));
    } else {
        body.extend(encode_compressed_u32(value as u32));
    }
    body
}

fn read_page(path: &std::path::Path, page_id: u64) -> Vec<u8> {
    let mut f = std::fs::File::open(path).unwrap();
    f.seek(SeekFrom::Start(page_id * common::PAGE_SIZE as u64)).unwrap();
    let mut buf = vec![0u8; common::PAGE_SIZE];
    f.read_exact(&mut buf).unwrap();
    buf
}

fn config(log_path: &std::path::Path, data_path: &std::path::Path) -> RecoveryConfig {
    RecoveryConfig::builder()
        .log_path(log_path.to_path_buf())
        .tablespace(SPACE, 0, data_path.to_path_buf())
        .buffer_pool_frames(4)
        .build()
        .unwrap()
}

#[test]
fn empty_log_touches_no_pages() {
    common::setup();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.dat");
    let data_path = dir.path().join("space7.dat");

    common::build_log_file(&log_path, 50, &[]);
    common::build_empty_tablespace_file(&data_path, 2);

    let cfg = config(&log_path, &data_path);
    let mut system = small_redo::RecoverySystem::open(&cfg).unwrap();
    let summary = system.run().unwrap();

    assert_eq!(summary.records_seen, 0);
    assert_eq!(summary.applied, 0);
}

#[test]
fn record_after_checkpoint_is_applied_with_exact_bytes_and_lsn() {
    common::setup();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.dat");
    let data_path = dir.path().join("space7.dat");

    let checkpoint_lsn = 50u64;
    let dummy = RawRecord {
        tag: 1, // MLOG_1BYTE: always sits exactly at the checkpoint LSN and
        // is skipped by the checkpoint gate, clearing the way for the
        // record under test to land strictly after it.
        address: Some((SPACE, 0)),
        body: n_byte_body(200, 9, 1),
    };
    let target_value = 0x0102030405060708u64;
    let real = RawRecord {
        tag: 8, // MLOG_8BYTES
        address: Some((SPACE, 0)),
        body: n_byte_body(100, target_value, 8),
    };
    common::build_log_file(&log_path, checkpoint_lsn, &[dummy, real]);
    common::build_empty_tablespace_file(&data_path, 1);

    let cfg = config(&log_path, &data_path);
    let mut system = small_redo::RecoverySystem::open(&cfg).unwrap();
    let summary = system.run().unwrap();

    assert_eq!(summary.records_seen, 2);
    assert_eq!(summary.skipped_by_lsn, 1);
    assert_eq!(summary.applied, 1);

    let page = read_page(&data_path, 0);
    assert_eq!(u64::from_be_bytes(page[100..108].try_into().unwrap()), target_value);

    let trailer_off = common::PAGE_SIZE - 8;
    assert_eq!(u32::from_be_bytes(page[trailer_off..trailer_off + 4].try_into().unwrap()), 0xDEAD_BEEF);
    assert!(u64::from_be_bytes(page[FIL_PAGE_LSN..FIL_PAGE_LSN + 8].try_into().unwrap()) > checkpoint_lsn);
}

#[test]
fn records_at_or_before_checkpoint_lsn_are_skipped_others_applied() {
    common::setup();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.dat");
    let data_path = dir.path().join("space7.dat");

    let checkpoint_lsn = 50u64;
    let at_checkpoint = RawRecord {
        tag: 4, // MLOG_4BYTES, page 0: lands exactly on the checkpoint LSN
        address: Some((SPACE, 0)),
        body: n_byte_body(50, 0xAABBCCDD, 4),
    };
    let after_checkpoint = RawRecord {
        tag: 4, // page 1: lands strictly after it
        address: Some((SPACE, 1)),
        body: n_byte_body(60, 0x1122_3344, 4),
    };
    common::build_log_file(&log_path, checkpoint_lsn, &[at_checkpoint, after_checkpoint]);
    common::build_empty_tablespace_file(&data_path, 2);

    let cfg = config(&log_path, &data_path);
    let mut system = small_redo::RecoverySystem::open(&cfg).unwrap();
    let summary = system.run().unwrap();

    assert_eq!(summary.skipped_by_lsn, 1);
    assert_eq!(summary.applied, 1);

    let page0 = read_page(&data_path, 0);
    assert_eq!(u32::from_be_bytes(page0[50..54].try_into().unwrap()), 0);

    let page1 = read_page(&data_path, 1);
    assert_eq!(u32::from_be_bytes(page1[60..64].try_into().unwrap()), 0x1122_3344);
}

#[test]
fn record_at_or_below_page_lsn_is_skipped_even_past_checkpoint() {
    common::setup();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.dat");
    let data_path = dir.path().join("space7.dat");

    let checkpoint_lsn = 10u64;
    let dummy = RawRecord {
        tag: 1,
        address: Some((SPACE, 0)),
        body: n_byte_body(5, 0, 1),
    };
    let real = RawRecord {
        tag: 4,
        address: Some((SPACE, 0)),
        body: n_byte_body(100, 0xDEAD_C0DE, 4),
    };
    common::build_log_file(&log_path, checkpoint_lsn, &[dummy, real]);
    common::build_empty_tablespace_file(&data_path, 1);

    // the page already carries a higher LSN than the real record will get
    // (checkpoint_lsn=10, dummy is 6 bytes, so the real record's LSN is 16).
    {
        let mut f = std::fs::OpenOptions::new().write(true).open(&data_path).unwrap();
        let mut page = vec![0u8; common::PAGE_SIZE];
        small_redo::io::write_be_u64(&mut page, FIL_PAGE_LSN, 9999);
        f.write_all(&page).unwrap();
    }

    let cfg = config(&log_path, &data_path);
    let mut system = small_redo::RecoverySystem::open(&cfg).unwrap();
    let summary = system.run().unwrap();

    assert_eq!(summary.applied, 0);
    assert_eq!(summary.skipped_by_lsn, 2);

    let page = read_page(&data_path, 0);
    assert_eq!(u32::from_be_bytes(page[100..104].try_into().unwrap()), 0);
    assert_eq!(u64::from_be_bytes(page[FIL_PAGE_LSN..FIL_PAGE_LSN + 8].try_into().unwrap()), 9999);
}

#[test]
fn page_create_then_insert_produces_a_linked_record_on_disk() {
    common::setup();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.dat");
    let data_path = dir.path().join("space7.dat");

    let checkpoint_lsn = 10u64;
    let create = RawRecord {
        tag: 37, // MLOG_COMP_PAGE_CREATE
        address: Some((SPACE, 0)),
        body: Vec::new(),
    };
    // a write to an unrelated page, purely to advance the log's LSN past
    // the one the page-create record just stamped onto page 0 -- without
    // it the insert record would start at exactly page 0's new LSN and be
    // skipped as already-applied by the page-LSN gate.
    let spacer = RawRecord {
        tag: 1, // MLOG_1BYTE
        address: Some((SPACE, 1)),
        body: n_byte_body(200, 9, 1),
    };

    let rec_bytes_header = [0u8; 5];
    let rec_data = 0xAABBCCDDu32.to_be_bytes();
    let mut insert_body = Vec::new();
    insert_body.extend(1u16.to_be_bytes()); // n_fields
    insert_body.extend(1u16.to_be_bytes()); // n_unique
    insert_body.extend(4u16.to_be_bytes()); // field length info (fixed width 4)
    insert_body.extend((small_redo::page::PAGE_NEW_INFIMUM as u16).to_be_bytes()); // cursor offset: the fresh page's infimum
    let rec_len = (rec_bytes_header.len() + rec_data.len()) as u32;
    insert_body.extend(encode_compressed_u32(rec_len << 1));
    insert_body.extend_from_slice(&rec_bytes_header);
    insert_body.extend_from_slice(&rec_data);
    let insert = RawRecord {
        tag: 38, // MLOG_COMP_REC_INSERT
        address: Some((SPACE, 0)),
        body: insert_body,
    };

    common::build_log_file(&log_path, checkpoint_lsn, &[create, spacer, insert]);
    common::build_empty_tablespace_file(&data_path, 2);

    let cfg = config(&log_path, &data_path);
    let mut system = small_redo::RecoverySystem::open(&cfg).unwrap();
    let summary = system.run().unwrap();

    assert_eq!(summary.records_seen, 3);
    assert_eq!(summary.applied, 3);

    let page = read_page(&data_path, 0);
    // infimum's next pointer should lead to the inserted record, whose
    // 4-byte payload should match what the insert record carried, and
    // whose own next pointer should lead on to the supremum.
    let infimum = small_redo::page::PAGE_NEW_INFIMUM;
    let next_delta = i16::from_be_bytes(page[infimum - 2..infimum].try_into().unwrap());
    let inserted = (infimum as i32 + next_delta as i32) as usize;
    assert_eq!(&page[inserted..inserted + 4], &rec_data);

    let supremum_delta = i16::from_be_bytes(page[inserted - 2..inserted].try_into().unwrap());
    let supremum = (inserted as i32 + supremum_delta as i32) as usize;
    assert_eq!(supremum, small_redo::page::PAGE_NEW_SUPREMUM);
}

#[test]
fn truncated_tail_block_stops_cleanly_and_resumes_once_flushed() {
    common::setup();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.dat");
    let data_path = dir.path().join("space7.dat");

    let checkpoint_lsn = 10u64;
    let dummy = RawRecord {
        tag: 1,
        address: Some((SPACE, 0)),
        body: n_byte_body(5, 0, 1),
    };
    let real = RawRecord {
        tag: 4,
        address: Some((SPACE, 0)),
        body: n_byte_body(100, 0xCAFEBABE, 4),
    };
    common::build_truncated_log_file(&log_path, checkpoint_lsn, &[dummy, real]);
    common::build_empty_tablespace_file(&data_path, 1);

    {
        let cfg = config(&log_path, &data_path);
        let mut system = small_redo::RecoverySystem::open(&cfg).unwrap();
        let summary = system.run().unwrap();
        assert_eq!(summary.records_seen, 0);
        assert_eq!(summary.applied, 0);
    }

    // mark the block as fully flushed without touching its payload bytes.
    {
        let mut f = std::fs::OpenOptions::new().read(true).write(true).open(&log_path).unwrap();
        let off = (4 * common::LOG_BLOCK_SIZE + common::LOG_BLOCK_HDR_DATA_LEN) as u64;
        f.seek(SeekFrom::Start(off)).unwrap();
        f.write_all(&(common::LOG_BLOCK_SIZE as u16).to_be_bytes()).unwrap();
    }

    let cfg = config(&log_path, &data_path);
    let mut system = small_redo::RecoverySystem::open(&cfg).unwrap();
    let summary = system.run().unwrap();

    assert_eq!(summary.records_seen, 2);
    assert_eq!(summary.skipped_by_lsn, 1);
    assert_eq!(summary.applied, 1);

    let page = read_page(&data_path, 0);
    assert_eq!(u32::from_be_bytes(page[100..104].try_into().unwrap()), 0xCAFEBABE);
}
