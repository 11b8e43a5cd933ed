//! The block device: fixed-size page read/write against a flat LBA space,
//! plus the tablespace-to-LBA mapping used to address it.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::SmallError;
use crate::types::{PageId, SpaceId, PAGE_SIZE};

/// Default starting LBA of the first mapped tablespace.
pub const DEFAULT_TABLESPACE_BASE_LBA: u64 = 26;

/// Default number of tablespaces mapped when no explicit map is supplied.
pub const DEFAULT_TABLESPACE_COUNT: u32 = 20;

pub trait BlockDevice {
    /// Reads `dst.len() / PAGE_SIZE` pages starting at `lpa` into `dst`.
    fn read(&mut self, lpa: u64, dst: &mut [u8]) -> Result<(), SmallError>;
    /// Writes `src.len() / PAGE_SIZE` pages starting at `lpa`.
    fn write(&mut self, lpa: u64, src: &[u8]) -> Result<(), SmallError>;
}

/// One `std::fs::File` per named region (the log partition, or one
/// tablespace), seeking to `lpa * PAGE_SIZE` before every operation --
/// Page-oriented and big-endian rather than typed through an
/// `Encodeable`/`Decodeable` pair.
pub struct FileBlockDevice {
    file: File,
}

impl FileBlockDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SmallError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(FileBlockDevice { file })
    }
}

impl BlockDevice for FileBlockDevice {
    fn read(&mut self, lpa: u64, dst: &mut [u8]) -> Result<(), SmallError> {
        self.file.seek(SeekFrom::Start(lpa * PAGE_SIZE as u64))?;
        self.file.read_exact(dst)?;
        Ok(())
    }

    fn write(&mut self, lpa: u64, src: &[u8]) -> Result<(), SmallError> {
        self.file.seek(SeekFrom::Start(lpa * PAGE_SIZE as u64))?;
        self.file.write_all(src)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Maps a logical tablespace id to a partition base LBA. Overridable at
/// config time so tests can address small synthetic tablespaces without
/// recompiling.
#[derive(Clone, Debug)]
pub struct TablespaceMap {
    base_lba: HashMap<SpaceId, u64>,
}

impl TablespaceMap {
    pub fn new() -> Self {
        TablespaceMap {
            base_lba: HashMap::new(),
        }
    }

    /// The default map: `DEFAULT_TABLESPACE_COUNT` tablespaces, ids `0..N`,
    /// starting at `DEFAULT_TABLESPACE_BASE_LBA`, one data page (32 log
    /// blocks' worth of LBA space is irrelevant here; this is the data
    /// partition) apart.
    pub fn default_map() -> Self {
        let mut m = TablespaceMap::new();
        for i in 0..DEFAULT_TABLESPACE_COUNT {
            m.insert(i, DEFAULT_TABLESPACE_BASE_LBA + i as u64);
        }
        m
    }

    pub fn insert(&mut self, space_id: SpaceId, base_lba: u64) {
        self.base_lba.insert(space_id, base_lba);
    }

    pub fn base_lba(&self, space_id: SpaceId) -> Result<u64, SmallError> {
        self.base_lba
            .get(&space_id)
            .copied()
            .ok_or_else(|| SmallError::unknown_tablespace(space_id))
    }

    pub fn page_lba(&self, space_id: SpaceId, page_id: PageId) -> Result<u64, SmallError> {
        Ok(self.base_lba(space_id)? + page_id as u64)
    }
}

impl Default for TablespaceMap {
    fn default() -> Self {
        Self::default_map()
    }
}

/// A directory of one open [`FileBlockDevice`] per tablespace, keyed by
/// space id. Pages are addressed `(space_id, page_id)`; the device itself
/// only ever sees a flat `lpa`.
pub struct TablespaceFiles {
    map: TablespaceMap,
    files: HashMap<SpaceId, FileBlockDevice>,
    paths: HashMap<SpaceId, PathBuf>,
}

impl TablespaceFiles {
    pub fn new(map: TablespaceMap) -> Self {
        TablespaceFiles {
            map,
            files: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    pub fn register(&mut self, space_id: SpaceId, path: impl AsRef<Path>) -> Result<(), SmallError> {
        let path = path.as_ref().to_path_buf();
        let dev = FileBlockDevice::open(&path)?;
        self.files.insert(space_id, dev);
        self.paths.insert(space_id, path);
        Ok(())
    }

    pub fn tablespace_map(&self) -> &TablespaceMap {
        &self.map
    }

    pub fn read_page(&mut self, space_id: SpaceId, page_id: PageId, dst: &mut [u8; PAGE_SIZE]) -> Result<(), SmallError> {
        let dev = self
            .files
            .get_mut(&space_id)
            .ok_or_else(|| SmallError::unknown_tablespace(space_id))?;
        dev.read(page_id as u64, dst)
    }

    pub fn write_page(&mut self, space_id: SpaceId, page_id: PageId, src: &[u8; PAGE_SIZE]) -> Result<(), SmallError> {
        let dev = self
            .files
            .get_mut(&space_id)
            .ok_or_else(|| SmallError::unknown_tablespace(space_id))?;
        dev.write(page_id as u64, src)
    }
}
