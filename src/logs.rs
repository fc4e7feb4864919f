//! Log management for runguard
//!
//! Leveled records are always mirrored to the console and, when enabled,
//! appended to a size-bounded set of rotating log files. Nothing in here
//! returns an error to the caller of [`Logger::log`]: persistence problems
//! degrade to console-only output for that record.

use crate::constants::TIMESTAMP_FORMAT;
use crate::error::{Result, RunGuardError};
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Log follow polling interval
const LOG_FOLLOW_INTERVAL: Duration = Duration::from_millis(100);

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log line before it is emitted
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    /// Create a record stamped with the current local time
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self::with_timestamp(Local::now().naive_local(), level, message)
    }

    pub fn with_timestamp(
        timestamp: NaiveDateTime,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] : {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level,
            self.message
        )
    }
}

/// Console stream a record is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Destination for console output
pub trait Console: Send + Sync {
    fn write_line(&self, stream: Stream, line: &str);
}

/// The process's real stdout and stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write_line(&self, stream: Stream, line: &str) {
        // A closed pipe must not take the caller down with it
        let _ = match stream {
            Stream::Stdout => writeln!(std::io::stdout().lock(), "{}", line),
            Stream::Stderr => writeln!(std::io::stderr().lock(), "{}", line),
        };
    }
}

/// Console that keeps every line in memory
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn stdout(&self) -> Vec<String> {
        self.stream_lines(Stream::Stdout)
    }

    pub fn stderr(&self) -> Vec<String> {
        self.stream_lines(Stream::Stderr)
    }

    fn stream_lines(&self, wanted: Stream) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(stream, _)| *stream == wanted)
            .map(|(_, line)| line)
            .collect()
    }
}

impl Console for MemoryConsole {
    fn write_line(&self, stream: Stream, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((stream, line.to_string()));
    }
}

/// Where and how log records are persisted
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Persist records to disk in addition to the console
    pub enabled: bool,
    pub directory: PathBuf,
    /// Base name of the current generation, e.g. `backup.log`
    pub file_name: String,
    /// Size of the current generation that triggers rotation
    pub max_bytes: u64,
    /// Number of rotated generations kept
    pub backup_count: usize,
}

impl LogSettings {
    /// Console-only settings, used before a run's own configuration exists
    pub fn console_only() -> Self {
        Self {
            enabled: false,
            directory: std::env::temp_dir(),
            file_name: format!("{}.log", crate::constants::APP_DIR_NAME),
            max_bytes: crate::constants::DEFAULT_MAX_LOG_BYTES,
            backup_count: crate::constants::DEFAULT_LOG_BACKUPS,
        }
    }

    pub fn current_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Path of rotated generation `index`; `1` is the most recent
    pub fn backup_path(&self, index: usize) -> PathBuf {
        self.directory.join(format!("{}.{}", self.file_name, index))
    }

    /// Information about the current file and every backup slot
    pub fn generations(&self) -> Result<Vec<LogInfo>> {
        let mut paths = vec![self.current_path()];
        paths.extend((1..=self.backup_count).map(|index| self.backup_path(index)));
        paths.iter().map(|path| get_log_info(path)).collect()
    }
}

/// Logging sink shared by every component of a run
pub struct Logger {
    settings: LogSettings,
    console: Arc<dyn Console>,
    write_lock: Mutex<()>,
}

impl Logger {
    pub fn new(settings: LogSettings, console: Arc<dyn Console>) -> Self {
        Self {
            settings,
            console,
            write_lock: Mutex::new(()),
        }
    }

    /// Logger writing to the real stdout and stderr
    pub fn stdio(settings: LogSettings) -> Self {
        Self::new(settings, Arc::new(StdConsole))
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    /// Emit a record. Never fails.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let record = LogRecord::new(level, message.as_ref());
        let line = record.to_string();
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut stream = match level {
            LogLevel::Error => Stream::Stderr,
            _ => Stream::Stdout,
        };
        let mut problems = Vec::new();

        if self.settings.enabled {
            match self.append(&line) {
                Ok(()) => {
                    if let Err(err) = self.rotate_if_needed() {
                        problems.push(err);
                    }
                }
                Err(err) => {
                    stream = Stream::Stderr;
                    problems.push(err);
                }
            }
        }

        self.console.write_line(stream, &line);
        for problem in problems {
            let notice = LogRecord::new(
                LogLevel::Warn,
                format!("{}; continuing with console output", problem),
            );
            self.console.write_line(Stream::Stderr, &notice.to_string());
        }
    }

    fn append(&self, line: &str) -> Result<()> {
        let directory = &self.settings.directory;
        fs::create_dir_all(directory).map_err(|e| {
            RunGuardError::LogDirectoryUnavailable(format!("{}: {}", directory.display(), e))
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.settings.current_path())
            .map_err(RunGuardError::Io)?;
        writeln!(file, "{}", line).map_err(RunGuardError::Io)?;
        Ok(())
    }

    /// Rotate the current generation once it has grown past `max_bytes`
    fn rotate_if_needed(&self) -> Result<bool> {
        let current = self.settings.current_path();
        let size = fs::metadata(&current).map_err(RunGuardError::Io)?.len();
        if size <= self.settings.max_bytes {
            return Ok(false);
        }

        let notice = LogRecord::new(
            LogLevel::Info,
            format!(
                "Rotating log file {} ({} bytes > {} bytes)",
                current.display(),
                size,
                self.settings.max_bytes
            ),
        )
        .to_string();
        self.append(&notice)?;
        self.console.write_line(Stream::Stdout, &notice);

        self.rotate()?;
        Ok(true)
    }

    fn rotate(&self) -> Result<()> {
        let current = self.settings.current_path();
        let backups = self.settings.backup_count;

        if backups == 0 {
            File::create(&current).map_err(|e| rotation_error("truncating", &current, e))?;
            return Ok(());
        }

        for index in (1..backups).rev() {
            let from = self.settings.backup_path(index);
            if from.exists() {
                replace(&from, &self.settings.backup_path(index + 1))?;
            }
        }

        replace(&current, &self.settings.backup_path(1))?;
        File::create(&current).map_err(|e| rotation_error("recreating", &current, e))?;
        Ok(())
    }
}

/// Move `from` onto `to`, dropping whatever `to` held only at that moment.
///
/// A rotation that stopped half way leaves the slot above the failure empty,
/// so retrying never discards a generation that was not about to be replaced.
fn replace(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        fs::remove_file(to).map_err(|e| rotation_error("removing", to, e))?;
    }
    fs::rename(from, to).map_err(|e| rotation_error("moving", from, e))
}

fn rotation_error(action: &str, path: &Path, err: std::io::Error) -> RunGuardError {
    RunGuardError::RotationFailure(format!("{} {}: {}", action, path.display(), err))
}

/// Read the last N lines from a log file
pub fn read_log_lines(log_path: &Path, lines: usize) -> Result<Vec<String>> {
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(log_path).map_err(RunGuardError::Io)?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader
        .lines()
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(RunGuardError::Io)?;

    let start_index = all_lines.len().saturating_sub(lines);
    Ok(all_lines[start_index..].to_vec())
}

/// Print new lines appended to a log file until interrupted
pub fn follow_log(log_path: &Path) -> Result<()> {
    if !log_path.exists() {
        println!("Log file not found: {}", log_path.display());
        return Ok(());
    }

    let mut file = File::open(log_path).map_err(RunGuardError::Io)?;
    file.seek(SeekFrom::End(0)).map_err(RunGuardError::Io)?;

    let mut reader = BufReader::new(file);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => {
                // Rotation swaps the file out from under us; reopen when it shrinks
                let position = reader.stream_position().map_err(RunGuardError::Io)?;
                let on_disk = fs::metadata(log_path).map(|m| m.len()).unwrap_or(position);
                if on_disk < position {
                    reader = BufReader::new(File::open(log_path).map_err(RunGuardError::Io)?);
                    continue;
                }
                thread::sleep(LOG_FOLLOW_INTERVAL);
            }
            Ok(_) => print!("{}", line),
            Err(e) => {
                eprintln!("Error reading log: {}", e);
                break;
            }
        }
    }

    Ok(())
}

/// Get log file information
pub fn get_log_info(log_path: &Path) -> Result<LogInfo> {
    if !log_path.exists() {
        return Ok(LogInfo {
            path: log_path.to_path_buf(),
            exists: false,
            size: 0,
            line_count: 0,
        });
    }

    let metadata = fs::metadata(log_path).map_err(RunGuardError::Io)?;
    let file = File::open(log_path).map_err(RunGuardError::Io)?;
    let line_count = BufReader::new(file).lines().count();

    Ok(LogInfo {
        path: log_path.to_path_buf(),
        exists: true,
        size: metadata.len(),
        line_count,
    })
}

/// Information about a log file
#[derive(Debug, Clone, serde::Serialize)]
pub struct LogInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size: u64,
    pub line_count: usize,
}

impl LogInfo {
    /// Format the log size in human-readable format
    pub fn format_size(&self) -> String {
        if self.size < 1024 {
            format!("{} B", self.size)
        } else if self.size < 1024 * 1024 {
            format!("{:.1} KB", self.size as f64 / 1024.0)
        } else {
            format!("{:.1} MB", self.size as f64 / (1024.0 * 1024.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn settings(dir: &Path, max_bytes: u64, backup_count: usize) -> LogSettings {
        LogSettings {
            enabled: true,
            directory: dir.to_path_buf(),
            file_name: "job.log".to_string(),
            max_bytes,
            backup_count,
        }
    }

    fn logger(settings: LogSettings) -> (Logger, Arc<MemoryConsole>) {
        let console = Arc::new(MemoryConsole::new());
        (Logger::new(settings, console.clone()), console)
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn record_uses_fixed_line_format() {
        let timestamp = NaiveDate::from_ymd_opt(2026, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let record = LogRecord::with_timestamp(timestamp, LogLevel::Warn, "disk almost full");
        assert_eq!(record.to_string(), "2026-01-02 03:04:05 [WARN] : disk almost full");
    }

    #[test]
    fn console_only_settings_never_touch_disk() {
        let console = Arc::new(MemoryConsole::new());
        let logger = Logger::new(LogSettings::console_only(), console.clone());

        logger.error("bad flag");

        assert_eq!(console.stderr().len(), 1);
        assert!(console.stderr()[0].ends_with("[ERROR] : bad flag"));
        assert!(console.stdout().is_empty());
    }

    #[test]
    fn console_only_when_persistence_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = settings(dir.path(), 100, 2);
        config.enabled = false;
        let (logger, console) = logger(config);

        logger.info("starting");
        logger.warn("careful");
        logger.error("broken");

        let stdout = console.stdout();
        let stderr = console.stderr();
        assert_eq!(stdout.len(), 2);
        assert!(stdout[0].ends_with("[INFO] : starting"));
        assert!(stdout[1].ends_with("[WARN] : careful"));
        assert_eq!(stderr.len(), 1);
        assert!(stderr[0].ends_with("[ERROR] : broken"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn persisted_records_are_appended_and_mirrored() {
        let dir = TempDir::new().unwrap();
        let (logger, console) = logger(settings(&dir.path().join("nested"), 10_000, 2));

        logger.info("first");
        logger.error("second");

        let content = read(&dir.path().join("nested").join("job.log"));
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO] : first"));
        assert!(lines[1].ends_with("[ERROR] : second"));
        assert_eq!(console.stdout().len(), 1);
        assert_eq!(console.stderr().len(), 1);
    }

    #[test]
    fn rotation_keeps_configured_number_of_backups() {
        let dir = TempDir::new().unwrap();
        let config = settings(dir.path(), 100, 2);
        let (logger, _console) = logger(config.clone());

        // Each line is 70 bytes, so every second record crosses the threshold
        for i in 1..=6 {
            logger.info(format!("record-{:02}-{}", i, "x".repeat(30)));
        }

        assert!(config.backup_path(1).exists());
        assert!(config.backup_path(2).exists());
        assert!(!config.backup_path(3).exists());
        assert_eq!(fs::metadata(config.current_path()).unwrap().len(), 0);

        let newest = read(&config.backup_path(1));
        assert!(newest.contains("record-05"));
        assert!(newest.contains("record-06"));
        assert!(newest.contains("Rotating log file"));
        let older = read(&config.backup_path(2));
        assert!(older.contains("record-03"));
        assert!(older.contains("record-04"));
        assert!(!older.contains("record-01"));

        logger.info(format!("record-07-{}", "x".repeat(30)));
        let current = read(&config.current_path());
        assert_eq!(current.lines().count(), 1);
        assert!(current.contains("record-07"));
    }

    #[test]
    fn single_backup_never_creates_second_generation() {
        let dir = TempDir::new().unwrap();
        let config = settings(dir.path(), 50, 1);
        let (logger, _console) = logger(config.clone());

        for _ in 0..5 {
            logger.info("A".repeat(10));
        }

        assert!(config.backup_path(1).exists());
        assert!(!config.backup_path(2).exists());
        let current = read(&config.current_path());
        assert_eq!(current.lines().count(), 1);
    }

    #[test]
    fn failed_rotation_keeps_history_across_retries() {
        let dir = TempDir::new().unwrap();
        let config = settings(dir.path(), 50, 2);
        fs::write(config.backup_path(1), "gen-1\n").unwrap();
        // A directory in the oldest slot cannot be replaced
        fs::create_dir(config.backup_path(2)).unwrap();
        fs::write(config.backup_path(2).join("keep"), "x").unwrap();
        let (logger, console) = logger(config.clone());

        for i in 1..=4 {
            logger.info(format!("record-{}-{}", i, "A".repeat(30)));
        }

        assert_eq!(read(&config.backup_path(1)), "gen-1\n");
        assert!(config.backup_path(2).join("keep").exists());
        let current = read(&config.current_path());
        for i in 1..=4 {
            assert!(current.contains(&format!("record-{}-", i)));
        }
        assert!(console.stderr().iter().any(|l| l.contains("Log rotation failed")));
    }

    #[test]
    fn zero_backups_truncates_in_place() {
        let dir = TempDir::new().unwrap();
        let config = settings(dir.path(), 50, 0);
        let (logger, _console) = logger(config.clone());

        logger.info("A".repeat(30));
        logger.info("B".repeat(30));

        assert!(!config.backup_path(1).exists());
        assert_eq!(fs::metadata(config.current_path()).unwrap().len(), 0);
    }

    #[test]
    fn unusable_directory_degrades_to_stderr() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let (logger, console) = logger(settings(&blocker.join("logs"), 100, 2));

        logger.info("still visible");

        assert!(console.stdout().is_empty());
        let stderr = console.stderr();
        assert!(stderr.iter().any(|line| line.ends_with("[INFO] : still visible")));
        assert!(stderr.iter().any(|line| line.contains("Log directory unavailable")));
    }

    #[test]
    fn generations_report_every_slot() {
        let dir = TempDir::new().unwrap();
        let config = settings(dir.path(), 100, 2);
        let (logger, _console) = logger(config.clone());
        logger.info("hello");

        let generations = config.generations().unwrap();
        assert_eq!(generations.len(), 3);
        assert!(generations[0].exists);
        assert_eq!(generations[0].line_count, 1);
        assert!(!generations[1].exists);
        assert!(!generations[2].exists);
    }

    #[test]
    fn tail_returns_last_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tail.log");
        fs::write(&path, "one\ntwo\nthree\n").unwrap();

        assert_eq!(read_log_lines(&path, 2).unwrap(), vec!["two", "three"]);
        assert_eq!(read_log_lines(&path, 10).unwrap().len(), 3);
        assert!(read_log_lines(&dir.path().join("missing.log"), 5).unwrap().is_empty());
    }

    #[test]
    fn sizes_are_human_readable() {
        let info = |size| LogInfo {
            path: PathBuf::from("x.log"),
            exists: true,
            size,
            line_count: 0,
        };
        assert_eq!(info(512).format_size(), "512 B");
        assert_eq!(info(2048).format_size(), "2.0 KB");
        assert_eq!(info(3 * 1024 * 1024).format_size(), "3.0 MB");
    }
}
