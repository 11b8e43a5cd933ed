pub mod buffer_pool;
pub mod config;
pub mod device;
pub mod error;
pub mod io;
pub mod log;
pub mod log_init;
pub mod page;
pub mod recovery;
pub mod redo;
pub mod types;

pub use config::RecoveryConfig;
pub use error::{SmallError, SmallResult};
pub use recovery::{RecoverySummary, RecoverySystem};
