//! Process helpers for runguard
//!
//! Liveness probing for lock owners, PATH lookup for dependency checks,
//! and restoring default signal behaviour on the way out.

use std::env;
use std::path::{Path, PathBuf};

/// Something that can tell whether a process id refers to a running process
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the operating system process table
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl LivenessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }
}

/// Check if a process with the given PID is running
pub fn is_process_alive(pid: u32) -> bool {
    // 0 and anything that wraps negative would address process groups
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }

    #[cfg(unix)]
    {
        use libc::{EPERM, kill};
        if unsafe { kill(pid as i32, 0) } == 0 {
            return true;
        }
        // The process exists but belongs to someone else
        std::io::Error::last_os_error().raw_os_error() == Some(EPERM)
    }

    #[cfg(not(unix))]
    {
        // Without a portable probe only our own process is known to be alive
        pid == std::process::id()
    }
}

/// PID of the current process
pub fn current_pid() -> u32 {
    std::process::id()
}

/// Resolve a command name the way a shell would, using PATH
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return false,
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

/// Human readable name for the signals runguard listens to
pub fn signal_name(signo: i32) -> &'static str {
    #[cfg(unix)]
    {
        match signo {
            libc::SIGINT => "SIGINT",
            libc::SIGTERM => "SIGTERM",
            libc::SIGHUP => "SIGHUP",
            _ => "signal",
        }
    }

    #[cfg(not(unix))]
    {
        match signo {
            2 => "SIGINT",
            _ => "signal",
        }
    }
}

/// Restore the default disposition for `signo` and raise it against ourselves.
///
/// Only returns if the signal did not terminate the process, in which case
/// the caller should exit with `128 + signo`.
pub fn reraise_signal(signo: i32) {
    #[cfg(unix)]
    unsafe {
        libc::signal(signo, libc::SIG_DFL);
        libc::raise(signo);
    }

    #[cfg(not(unix))]
    {
        let _ = signo;
    }
}
