//! The recovery driver: owns one buffer pool and one log reader, and runs
//! the parse-then-apply loop to completion.
//!
//! No global singleton here -- the buffer pool and log reader are
//! constructed once by `RecoverySystem::open` and mutated through `&mut
//! self` for the life of the recovery pass, rather than stashed behind
//! a process-global `OnceCell`.

use log::info;

use crate::buffer_pool::BufferPool;
use crate::config::RecoveryConfig;
use crate::device::{FileBlockDevice, TablespaceFiles};
use crate::error::SmallError;
use crate::log::LogReader;
use crate::redo::{self, ApplyStats};

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoverySummary {
    pub passes: u64,
    pub records_seen: u64,
    pub applied: u64,
    pub skipped_no_op: u64,
    pub skipped_by_lsn: u64,
    pub failed: u64,
}

pub struct RecoverySystem {
    buffer_pool: BufferPool,
    log_reader: LogReader,
    tablespaces: TablespaceFiles,
}

impl RecoverySystem {
    pub fn open(config: &RecoveryConfig) -> Result<Self, SmallError> {
        let log_device = FileBlockDevice::open(&config.log_path)?;
        let log_reader = LogReader::open(log_device, config.parse_buffer_half_size)?;

        let mut tablespaces = TablespaceFiles::new(config.tablespace_map.clone());
        for (space_id, path) in &config.tablespace_files {
            tablespaces.register(*space_id, path)?;
        }

        Ok(RecoverySystem {
            buffer_pool: BufferPool::new(config.buffer_pool_frames),
            log_reader,
            tablespaces,
        })
    }

    /// Runs parse -> apply passes until the log reader reports end of log,
    /// then flushes the entire buffer pool back to the device.
    pub fn run(&mut self) -> Result<RecoverySummary, SmallError> {
        let checkpoint_lsn = self.log_reader.checkpoint().lsn;
        let mut summary = RecoverySummary::default();

        loop {
            let progress = self.log_reader.parse_pass()?;
            summary.passes += 1;
            summary.records_seen += progress.records_emitted as u64;

            if !progress.dispatch.is_empty() {
                let stats: ApplyStats =
                    redo::apply_dispatch(&progress.dispatch, checkpoint_lsn, &mut self.buffer_pool, &mut self.tablespaces)?;
                summary.applied += stats.applied;
                summary.skipped_no_op += stats.skipped_no_op;
                summary.skipped_by_lsn += stats.skipped_by_lsn;
                summary.failed += stats.failed;
            }

            if progress.records_emitted == 0 && progress.at_end_of_log {
                break;
            }
        }

        self.buffer_pool.flush_all(&mut self.tablespaces)?;
        info!(
            "recovery complete: {} passes, {} records seen, {} applied, {} skipped (no-op), {} skipped (lsn), {} failed (malformed)",
            summary.passes, summary.records_seen, summary.applied, summary.skipped_no_op, summary.skipped_by_lsn, summary.failed
        );
        Ok(summary)
    }
}
