use crate::config::Config;
use crate::error::Result;
use crate::lock::{LockRecord, LockState};
use crate::logs::LogInfo;
use crate::process::LivenessProbe;
use serde::Serialize;
use std::path::PathBuf;

/// Lock status enumeration
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    /// No marker on disk
    Free,
    Running,
    /// Marker left behind by a dead process
    Stale,
    Unreadable,
}

impl LockStatus {
    /// Get status display with icon
    pub fn display_with_icon(&self) -> &'static str {
        match self {
            LockStatus::Free => "🔴 Not running",
            LockStatus::Running => "🟢 Running",
            LockStatus::Stale => "🟡 Stale lock",
            LockStatus::Unreadable => "🟡 Unreadable lock",
        }
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_with_icon())
    }
}

/// Snapshot of an instance's lock and log files
#[derive(Serialize, Clone, Debug)]
pub struct StatusReport {
    pub identity: String,
    pub lock_path: PathBuf,
    pub status: LockStatus,
    pub owner_pid: Option<u32>,
    pub logging_enabled: bool,
    pub log_files: Vec<LogInfo>,
    pub checked_at: chrono::DateTime<chrono::Local>,
}

impl StatusReport {
    /// Inspect the lock marker and log generations for `config`
    pub fn collect(config: &Config, probe: &dyn LivenessProbe) -> Result<Self> {
        let lock_path = config.lock_path();
        let (status, owner_pid) = match LockRecord::inspect(&lock_path)? {
            LockState::Absent => (LockStatus::Free, None),
            LockState::Held(record) if probe.is_alive(record.owner_pid) => {
                (LockStatus::Running, Some(record.owner_pid))
            }
            LockState::Held(record) => (LockStatus::Stale, Some(record.owner_pid)),
            LockState::Unreadable(_) => (LockStatus::Unreadable, None),
        };

        Ok(StatusReport {
            identity: config.identity.clone(),
            lock_path,
            status,
            owner_pid,
            logging_enabled: config.log.enabled,
            log_files: config.log.generations()?,
            checked_at: chrono::Local::now(),
        })
    }

    /// Print detailed status information
    pub fn print_details(&self) {
        println!("Instance: {}", self.identity);
        println!("Status: {}", self.status);
        println!("Lock: {}", self.lock_path.display());

        if let Some(pid) = self.owner_pid {
            println!("PID: {}", pid);
        }

        let present: Vec<&LogInfo> = self.log_files.iter().filter(|info| info.exists).collect();
        if present.is_empty() {
            println!("Log files: none");
        } else {
            println!("Log files:");
            for info in present {
                println!(
                    "  {} ({}, {} lines)",
                    info.path.display(),
                    info.format_size(),
                    info.line_count
                );
            }
        }

        println!("Checked: {}", self.checked_at.to_rfc3339());
    }
}
