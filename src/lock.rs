//! Single-instance guard for runguard
//!
//! A marker file holding the owner's PID grants exclusive execution rights
//! for one identity. Markers whose owner is no longer alive are stale and get
//! reclaimed by the next acquirer.

use crate::error::{Result, RunGuardError};
use crate::logs::Logger;
use crate::process::{LivenessProbe, current_pid};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Attempts at create-if-absent before giving up on a marker that keeps changing
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// Owner of a lock marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub owner_pid: u32,
    pub path: PathBuf,
}

/// What is currently on disk at a lock path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Absent,
    Held(LockRecord),
    /// Marker exists but does not contain a PID
    Unreadable(String),
}

impl LockRecord {
    /// Read the marker at `path`
    pub fn inspect(path: &Path) -> Result<LockState> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LockState::Absent),
            Err(e) => return Err(RunGuardError::Io(e)),
        };

        match content.trim().parse::<u32>() {
            Ok(owner_pid) if owner_pid > 0 => Ok(LockState::Held(LockRecord {
                owner_pid,
                path: path.to_path_buf(),
            })),
            _ => Ok(LockState::Unreadable(content)),
        }
    }
}

/// Exclusive execution rights for one identity, released on drop
pub struct InstanceGuard {
    record: LockRecord,
    held: AtomicBool,
    logger: Arc<Logger>,
}

impl InstanceGuard {
    /// Take the lock at `path` for the current process.
    ///
    /// Fails with [`RunGuardError::AlreadyRunning`] when a live process owns
    /// the marker; the marker is left untouched in that case.
    pub fn acquire(
        path: impl Into<PathBuf>,
        logger: Arc<Logger>,
        probe: &dyn LivenessProbe,
    ) -> Result<Self> {
        let path = path.into();
        let pid = current_pid();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(RunGuardError::Io)?;
            }
        }

        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            match create_marker(&path, pid) {
                Ok(()) => {
                    logger.info(format!("Acquired lock {} (PID {})", path.display(), pid));
                    return Ok(Self {
                        record: LockRecord {
                            owner_pid: pid,
                            path,
                        },
                        held: AtomicBool::new(true),
                        logger,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(RunGuardError::Io(e)),
            }

            match LockRecord::inspect(&path)? {
                // Released between our create and our read
                LockState::Absent => continue,
                LockState::Held(record)
                    if record.owner_pid != pid && probe.is_alive(record.owner_pid) =>
                {
                    return Err(RunGuardError::AlreadyRunning {
                        pid: record.owner_pid,
                    });
                }
                LockState::Held(record) => {
                    logger.info(format!(
                        "Removing stale lock {} left by PID {}",
                        path.display(),
                        record.owner_pid
                    ));
                    remove_if_owned(&path, Some(record.owner_pid))?;
                }
                LockState::Unreadable(_) => {
                    logger.info(format!("Removing unreadable lock {}", path.display()));
                    remove_if_owned(&path, None)?;
                }
            }
        }

        Err(RunGuardError::Io(io::Error::other(format!(
            "could not acquire lock {} after {} attempts",
            path.display(),
            MAX_ACQUIRE_ATTEMPTS
        ))))
    }

    pub fn path(&self) -> &Path {
        &self.record.path
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Remove the marker. Only the first call does anything.
    pub fn release(&self) {
        if !self.held.swap(false, Ordering::SeqCst) {
            return;
        }

        let path = self.path();
        match remove_if_owned(path, Some(self.record.owner_pid)) {
            Ok(Removal::Removed) => {
                self.logger
                    .info(format!("Released lock {}", path.display()));
            }
            Ok(Removal::Missing) => {
                self.logger
                    .warn(format!("Lock {} was already removed", path.display()));
            }
            Ok(Removal::Foreign) => {
                self.logger.warn(format!(
                    "Lock {} now belongs to another process; leaving it in place",
                    path.display()
                ));
            }
            Err(e) => {
                self.logger
                    .warn(format!("Failed to remove lock {}: {}", path.display(), e));
            }
        }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Atomically create the marker with its full content.
///
/// The PID is written to a private file first and hard-linked into place, so
/// no reader ever sees a half-written marker. Filesystems without hard links
/// fall back to an exclusive create.
fn create_marker(path: &Path, pid: u32) -> io::Result<()> {
    let staging = staging_path(path, pid);
    fs::write(&staging, format!("{}\n", pid))?;

    let linked = fs::hard_link(&staging, path);
    let _ = fs::remove_file(&staging);

    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(_) => {
            let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
            if let Err(e) = writeln!(file, "{}", pid) {
                drop(file);
                let _ = fs::remove_file(path);
                return Err(e);
            }
            Ok(())
        }
    }
}

fn staging_path(path: &Path, pid: u32) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", pid));
    path.with_file_name(name)
}

#[derive(Debug, PartialEq, Eq)]
enum Removal {
    Removed,
    Missing,
    Foreign,
}

/// Remove the marker if it still names `expected` (`None` matches an unreadable marker)
fn remove_if_owned(path: &Path, expected: Option<u32>) -> Result<Removal> {
    let owner = match LockRecord::inspect(path)? {
        LockState::Absent => return Ok(Removal::Missing),
        LockState::Held(record) => Some(record.owner_pid),
        LockState::Unreadable(_) => None,
    };
    if owner != expected {
        return Ok(Removal::Foreign);
    }

    match fs::remove_file(path) {
        Ok(()) => Ok(Removal::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::Missing),
        Err(e) => Err(RunGuardError::Io(e)),
    }
}
