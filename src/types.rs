/// Logical tablespace identifier.
pub type SpaceId = u32;

/// In-tablespace page index.
pub type PageId = u32;

/// Monotone byte position in the logical log stream.
pub type Lsn = u64;

/// Size in bytes of one data page.
pub const PAGE_SIZE: usize = 16384;

/// Size in bytes of one log block, header+payload+trailer included.
pub const LOG_BLOCK_SIZE: usize = 512;

/// Number of 512-byte blocks per 16 KiB log page.
pub const N_BLOCKS_IN_A_PAGE: usize = PAGE_SIZE / LOG_BLOCK_SIZE;
