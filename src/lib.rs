//! runguard
//!
//! Runs a command under a single-instance lock with leveled, size-rotated
//! logging and guaranteed lock cleanup on exit, failure, or signal.

pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod logs;
pub mod process;
pub mod status;

pub use config::Config;
pub use error::{Result, RunGuardError};
pub use lifecycle::{Lifecycle, Outcome};
pub use lock::{InstanceGuard, LockRecord};
pub use logs::{LogLevel, LogRecord, LogSettings, Logger};
pub use status::{LockStatus, StatusReport};

/// Application constants
pub mod constants {
    /// Default log size before rotation (10MB)
    pub const DEFAULT_MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

    /// Default number of rotated generations kept
    pub const DEFAULT_LOG_BACKUPS: usize = 5;

    /// Directory name used under the per-user data and temp directories
    pub const APP_DIR_NAME: &str = "runguard";

    /// Timestamp layout of every log record
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    /// Default number of log lines to show
    pub const DEFAULT_LOG_LINES: usize = 50;

    /// Exit status when the job fails without a code of its own
    pub const EXIT_DEFAULT_FAILURE: i32 = 1;

    /// Exit status when another live instance holds the lock
    pub const EXIT_ALREADY_RUNNING: i32 = 1;

    /// Exit status when a required command is missing
    pub const EXIT_DEPENDENCY_MISSING: i32 = 127;
}
