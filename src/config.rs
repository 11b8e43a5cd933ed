//! Recovery configuration: log path, tablespace files, and the tunable
//! buffer-pool/parse-buffer sizes.

use std::path::PathBuf;

use crate::device::TablespaceMap;
use crate::log::DEFAULT_PARSE_BUFFER_HALF_SIZE;
use crate::types::SpaceId;

pub const DEFAULT_BUFFER_POOL_FRAMES: usize = 1024;

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub log_path: PathBuf,
    pub tablespace_files: Vec<(SpaceId, PathBuf)>,
    pub tablespace_map: TablespaceMap,
    pub buffer_pool_frames: usize,
    pub parse_buffer_half_size: usize,
}

impl RecoveryConfig {
    pub fn builder() -> RecoveryConfigBuilder {
        RecoveryConfigBuilder::new()
    }

    /// Reads `SMALL_REDO_LOG` and `SMALL_REDO_DATA_DIR`, discovering
    /// `<space_id>.ibd`-named files in the data directory the way the
    /// reference buffer pool scans its data directory for tablespace
    /// files, and defaulting to the standard 20-tablespace map starting at
    /// LBA 26.
    pub fn from_env() -> Result<Self, crate::error::SmallError> {
        let log_path = std::env::var("SMALL_REDO_LOG")
            .map_err(|_| crate::error::SmallError::new("SMALL_REDO_LOG is not set"))?;
        let data_dir = std::env::var("SMALL_REDO_DATA_DIR")
            .map_err(|_| crate::error::SmallError::new("SMALL_REDO_DATA_DIR is not set"))?;

        let mut tablespace_files = Vec::new();
        for entry in std::fs::read_dir(&data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("ibd") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(space_id) = stem.parse::<SpaceId>() {
                    tablespace_files.push((space_id, path));
                }
            }
        }

        Ok(RecoveryConfig {
            log_path: PathBuf::from(log_path),
            tablespace_files,
            tablespace_map: TablespaceMap::default_map(),
            buffer_pool_frames: DEFAULT_BUFFER_POOL_FRAMES,
            parse_buffer_half_size: DEFAULT_PARSE_BUFFER_HALF_SIZE,
        })
    }
}

pub struct RecoveryConfigBuilder {
    log_path: Option<PathBuf>,
    tablespace_files: Vec<(SpaceId, PathBuf)>,
    tablespace_map: TablespaceMap,
    buffer_pool_frames: usize,
    parse_buffer_half_size: usize,
}

impl RecoveryConfigBuilder {
    fn new() -> Self {
        RecoveryConfigBuilder {
            log_path: None,
            tablespace_files: Vec::new(),
            tablespace_map: TablespaceMap::new(),
            buffer_pool_frames: DEFAULT_BUFFER_POOL_FRAMES,
            parse_buffer_half_size: DEFAULT_PARSE_BUFFER_HALF_SIZE,
        }
    }

    pub fn log_path(mut self, p: impl Into<PathBuf>) -> Self {
        self.log_path = Some(p.into());
        self
    }

    pub fn tablespace(mut self, space_id: SpaceId, base_lba: u64, path: impl Into<PathBuf>) -> Self {
        self.tablespace_map.insert(space_id, base_lba);
        self.tablespace_files.push((space_id, path.into()));
        self
    }

    pub fn buffer_pool_frames(mut self, n: usize) -> Self {
        self.buffer_pool_frames = n;
        self
    }

    pub fn parse_buffer_half_size(mut self, n: usize) -> Self {
        self.parse_buffer_half_size = n;
        self
    }

    pub fn build(self) -> Result<RecoveryConfig, crate::error::SmallError> {
        let log_path = self
            .log_path
            .ok_or_else(|| crate::error::SmallError::new("log_path is required"))?;
        Ok(RecoveryConfig {
            log_path,
            tablespace_files: self.tablespace_files,
            tablespace_map: self.tablespace_map,
            buffer_pool_frames: self.buffer_pool_frames,
            parse_buffer_half_size: self.parse_buffer_half_size,
        })
    }
}

impl Default for RecoveryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
