//! Configuration management for runguard
//!
//! Resolves the tool identity, the lock marker location, and the log
//! directory with its fallbacks.

use crate::constants::{APP_DIR_NAME, DEFAULT_LOG_BACKUPS, DEFAULT_MAX_LOG_BYTES};
use crate::error::{Result, RunGuardError};
use crate::logs::LogSettings;
use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Resolved settings for one guarded run
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity the lock and log files are keyed by
    pub identity: String,
    /// Directory holding `<identity>.lock`
    pub lock_dir: PathBuf,
    pub log: LogSettings,
    explicit_log_dir: bool,
}

impl Config {
    /// Defaults for `identity`: console-only logging, lock in the temp dir
    pub fn new(identity: &str) -> Result<Self> {
        let identity = sanitize_identity(identity)?;
        let log = LogSettings {
            enabled: false,
            directory: preferred_log_dir(),
            file_name: format!("{}.log", identity),
            max_bytes: DEFAULT_MAX_LOG_BYTES,
            backup_count: DEFAULT_LOG_BACKUPS,
        };

        Ok(Config {
            identity,
            lock_dir: env::temp_dir(),
            log,
            explicit_log_dir: false,
        })
    }

    /// Turn persistence on or off. Has no effect once a log directory was supplied.
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        if self.explicit_log_dir {
            return self;
        }
        self.log.enabled = enabled;
        if enabled {
            self.log.directory = resolve_default_log_dir();
        }
        self
    }

    /// Use `dir` for log files; supplying a directory implies persistence
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log.directory = dir.into();
        self.log.enabled = true;
        self.explicit_log_dir = true;
        self
    }

    pub fn lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    pub fn max_log_bytes(mut self, max_bytes: u64) -> Result<Self> {
        if max_bytes == 0 {
            return Err(RunGuardError::Config(
                "maximum log size must be greater than zero".to_string(),
            ));
        }
        self.log.max_bytes = max_bytes;
        Ok(self)
    }

    pub fn log_backups(mut self, backup_count: usize) -> Self {
        self.log.backup_count = backup_count;
        self
    }

    /// Path of the lock marker for this identity
    pub fn lock_path(&self) -> PathBuf {
        self.lock_dir.join(format!("{}.lock", self.identity))
    }
}

/// Derive an identity from the command being wrapped
pub fn identity_from_command(command: &str) -> Result<String> {
    let stem = Path::new(command)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .ok_or_else(|| RunGuardError::Config(format!("cannot derive a name from '{}'", command)))?;
    sanitize_identity(&stem)
}

/// Make an identity safe to use as a file name
pub fn sanitize_identity(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(RunGuardError::Config(format!("invalid instance name '{}'", raw)));
    }
    Ok(cleaned)
}

/// Per-user log location, whether or not it is usable
fn preferred_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR_NAME)
        .join("logs")
}

fn fallback_log_dir() -> PathBuf {
    env::temp_dir().join(APP_DIR_NAME).join("logs")
}

/// Per-user log directory, falling back to the temp dir when it is unusable
pub fn resolve_default_log_dir() -> PathBuf {
    choose_log_dir(preferred_log_dir(), fallback_log_dir())
}

fn choose_log_dir(preferred: PathBuf, fallback: PathBuf) -> PathBuf {
    if is_writable_dir(&preferred) {
        preferred
    } else {
        fallback
    }
}

/// The directory exists (or can be created) and this process can create files in it
fn is_writable_dir(path: &Path) -> bool {
    if fs::create_dir_all(path).is_err() {
        return false;
    }

    let marker = path.join(format!(".{}-write-check-{}", APP_DIR_NAME, std::process::id()));
    let created = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .or_else(|e| {
            // Left behind by a crashed run with a recycled PID
            if e.kind() == io::ErrorKind::AlreadyExists {
                fs::remove_file(&marker)?;
                OpenOptions::new().write(true).create_new(true).open(&marker)
            } else {
                Err(e)
            }
        });

    match created {
        Ok(file) => {
            drop(file);
            let _ = fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}
