//! Log record type tags and per-type body parsers.
//!
//! Every parser receives a [`Cursor`] positioned just after the
//! tablespace-id/page-id pair and returns the number of bytes its body
//! occupies (not including the type byte + compressed ids already
//! consumed by the caller). Parsers never mutate page bytes -- the
//! applier in `crate::redo` reparses the body when it needs the decoded
//! fields.

use crate::error::SmallError;
use crate::io::Cursor;

pub const MLOG_SINGLE_REC_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum RecordType {
    Mlog1Byte,
    Mlog2Bytes,
    Mlog4Bytes,
    Mlog8Bytes,
    RecInsert,
    RecClustDeleteMark,
    RecSecDeleteMark,
    RecUpdateInPlace,
    RecDelete,
    ListEndDelete,
    ListStartDelete,
    ListEndCopyCreated,
    PageReorganize,
    PageCreate,
    UndoInsert,
    UndoEraseEnd,
    UndoInit,
    UndoHdrDiscard,
    UndoHdrReuse,
    UndoHdrCreate,
    RecMinMark,
    IbufBitmapInit,
    InitFilePage,
    WriteString,
    MultiRecEnd,
    DummyRecord,
    FileDelete,
    CompRecMinMark,
    CompPageCreate,
    CompRecInsert,
    CompRecClustDeleteMark,
    CompRecSecDeleteMark,
    CompRecUpdateInPlace,
    CompRecDelete,
    CompListEndDelete,
    CompListStartDelete,
    CompListEndCopyCreated,
    CompPageReorganize,
    FileCreate2,
    ZipWriteNodePtr,
    ZipWriteBlobPtr,
    ZipWriteHeader,
    ZipPageCompress,
    ZipPageCompressNoData,
    ZipPageReorganize,
    FileRename2,
    FileName,
    Checkpoint,
    PageCreateRtree,
    CompPageCreateRtree,
    InitFilePage2,
    Truncate,
    IndexLoad,
}

impl RecordType {
    pub fn from_tag(tag: u8) -> Option<RecordType> {
        use RecordType::*;
        Some(match tag {
            1 => Mlog1Byte,
            2 => Mlog2Bytes,
            4 => Mlog4Bytes,
            8 => Mlog8Bytes,
            9 => RecInsert,
            10 => RecClustDeleteMark,
            11 => RecSecDeleteMark,
            13 => RecUpdateInPlace,
            14 => RecDelete,
            15 => ListEndDelete,
            16 => ListStartDelete,
            17 => ListEndCopyCreated,
            18 => PageReorganize,
            19 => PageCreate,
            20 => UndoInsert,
            21 => UndoEraseEnd,
            22 => UndoInit,
            23 => UndoHdrDiscard,
            24 => UndoHdrReuse,
            25 => UndoHdrCreate,
            26 => RecMinMark,
            27 => IbufBitmapInit,
            29 => InitFilePage,
            30 => WriteString,
            31 => MultiRecEnd,
            32 => DummyRecord,
            35 => FileDelete,
            36 => CompRecMinMark,
            37 => CompPageCreate,
            38 => CompRecInsert,
            39 => CompRecClustDeleteMark,
            40 => CompRecSecDeleteMark,
            41 => CompRecUpdateInPlace,
            42 => CompRecDelete,
            43 => CompListEndDelete,
            44 => CompListStartDelete,
            45 => CompListEndCopyCreated,
            46 => CompPageReorganize,
            47 => FileCreate2,
            48 => ZipWriteNodePtr,
            49 => ZipWriteBlobPtr,
            50 => ZipWriteHeader,
            51 => ZipPageCompress,
            52 => ZipPageCompressNoData,
            53 => ZipPageReorganize,
            54 => FileRename2,
            55 => FileName,
            56 => Checkpoint,
            57 => PageCreateRtree,
            58 => CompPageCreateRtree,
            59 => InitFilePage2,
            60 => Truncate,
            61 => IndexLoad,
            _ => return None,
        })
    }

    /// Whether this type carries a `space, page` address pair (true for
    /// everything except the three fixed-length sentinels).
    pub fn has_page_address(self) -> bool {
        !matches!(
            self,
            RecordType::MultiRecEnd | RecordType::DummyRecord | RecordType::Checkpoint
        )
    }
}

/// The body-parse outcome: how many bytes the body (after type + space +
/// page) occupied.
pub type BodyLen = usize;

/// Parses the body of `ty` starting at `cur`'s current position, returning
/// the number of bytes consumed. Does not mutate `cur`'s caller-visible
/// state beyond its own advance -- callers read `cur.position()` deltas.
pub fn parse_body(ty: RecordType, cur: &mut Cursor) -> Result<BodyLen, SmallError> {
    use RecordType::*;
    let start = cur.position();
    match ty {
        MultiRecEnd | DummyRecord => {
            // fixed 1-byte records: nothing more to consume.
        }
        Checkpoint => {
            cur.take(8)?;
        }
        Mlog1Byte | Mlog2Bytes | Mlog4Bytes => {
            cur.read_u16()?;
            cur.read_compressed_u32()?;
        }
        Mlog8Bytes => {
            cur.read_u16()?;
            cur.read_compressed_u64()?;
        }
        WriteString => {
            cur.read_u16()?;
            let len = cur.read_u16()?;
            cur.take(len as usize)?;
        }
        InitFilePage | InitFilePage2 => {
            // fixed-length: no body beyond the type+space+page already read.
        }
        CompPageCreate | PageCreate | PageCreateRtree | CompPageCreateRtree => {
            // no further body bytes: the page-create operators derive
            // everything from the address.
        }
        CompRecMinMark | RecMinMark => {
            cur.read_u16()?; // offset of the record to mark
        }
        CompRecClustDeleteMark | RecClustDeleteMark => {
            parse_clust_delete_mark(cur)?;
        }
        CompRecSecDeleteMark | RecSecDeleteMark => {
            cur.read_u16()?; // offset of the record to mark
        }
        CompRecUpdateInPlace | RecUpdateInPlace => {
            parse_update_in_place(cur)?;
        }
        CompRecInsert | RecInsert => {
            parse_rec_insert(cur)?;
        }
        CompRecDelete | RecDelete => {
            cur.read_u16()?; // offset of the record to delete
        }
        ListEndDelete | ListStartDelete | CompListEndDelete | CompListStartDelete => {
            cur.read_u16()?; // offset of the boundary record
        }
        ListEndCopyCreated | CompListEndCopyCreated => {
            let len = cur.read_u32()?;
            cur.take(len as usize)?;
        }
        PageReorganize | CompPageReorganize | ZipPageReorganize => {
            // legacy body is empty for the non-zip variants; zip variant
            // carries a compression level byte.
            if matches!(ty, ZipPageReorganize) {
                cur.take(1)?;
            }
        }
        UndoInsert => {
            let len = cur.read_u16()?;
            cur.take(len as usize)?;
        }
        UndoEraseEnd => {}
        UndoInit => {
            cur.read_compressed_u32()?; // undo type
        }
        UndoHdrDiscard => {}
        UndoHdrReuse | UndoHdrCreate => {
            cur.read_compressed_u64()?; // trx id
        }
        IbufBitmapInit => {}
        FileDelete | FileCreate2 | FileRename2 | FileName => {
            let len = cur.read_u16()?;
            cur.take(len as usize)?;
        }
        ZipWriteNodePtr => {
            cur.take(1)?; // page_zip size marker
            cur.read_u16()?;
            cur.take(4)?;
        }
        ZipWriteBlobPtr => {
            cur.take(1)?;
            cur.read_u16()?;
            cur.take(20)?;
        }
        ZipWriteHeader => {
            cur.read_u16()?;
            let len = cur.read_u8()? as usize;
            cur.take(len)?;
        }
        ZipPageCompress => {
            let len = cur.read_u16()?;
            cur.take(len as usize)?;
        }
        ZipPageCompressNoData => {
            cur.take(1)?;
        }
        Truncate => {
            cur.read_u64()?;
        }
        IndexLoad => {
            cur.read_u64()?;
        }
    }
    Ok(cur.position() - start)
}

fn parse_clust_delete_mark(cur: &mut Cursor) -> Result<(), SmallError> {
    cur.read_u16()?; // flags
    cur.read_u16()?; // pos of trx id column
    cur.read_compressed_u64()?; // trx id
    cur.read_u8()?; // roll ptr length marker
    cur.take(7)?; // roll ptr
    cur.read_u16()?; // offset of the record
    Ok(())
}

fn parse_update_in_place(cur: &mut Cursor) -> Result<(), SmallError> {
    cur.read_u8()?; // info bits
    cur.read_u16()?; // pos of trx id column
    cur.read_compressed_u64()?; // trx id
    cur.read_u8()?;
    cur.take(7)?; // roll ptr
    cur.read_u16()?; // offset of the record
    let n_fields = cur.read_u16()?;
    for _ in 0..n_fields {
        cur.read_compressed_u32()?; // field number
        let len = cur.read_compressed_u32()?;
        if len != u32::MAX {
            cur.take(len as usize)?;
        }
    }
    Ok(())
}

fn parse_rec_insert(cur: &mut Cursor) -> Result<(), SmallError> {
    let n_fields = cur.read_u16()?;
    let n_unique = cur.read_u16()?;
    for _ in 0..n_fields {
        cur.read_u16()?; // field length/flags
    }
    let _ = n_unique;
    cur.read_u16()?; // offset of the cursor record to insert after
    let end_seg_len = cur.read_compressed_u32()?;
    if end_seg_len & 1 != 0 {
        cur.read_u8()?; // info_and_status_bits
        cur.read_u16()?; // origin_offset
        cur.read_u16()?; // mismatch_index
    }
    cur.take((end_seg_len >> 1) as usize)?;
    Ok(())
}
