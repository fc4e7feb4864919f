use crate::config::{Config, identity_from_command};
use crate::constants::{DEFAULT_LOG_BACKUPS, DEFAULT_LOG_LINES, DEFAULT_MAX_LOG_BYTES};
use crate::error::{Result, RunGuardError};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// runguard CLI application
#[derive(Parser)]
#[command(name = "runguard")]
#[command(about = "Run a command as a single instance with rotating logs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GuardOptions {
    /// Instance name the lock and log files are keyed by
    #[arg(long, env = "RUNGUARD_NAME")]
    pub name: Option<String>,
    /// Persist log records to disk
    #[arg(long, env = "RUNGUARD_ENABLE_LOGGING", value_parser = BoolishValueParser::new())]
    pub enable_logging: bool,
    /// Log directory (implies --enable-logging)
    #[arg(long, env = "RUNGUARD_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
    /// Directory holding the lock marker
    #[arg(long, env = "RUNGUARD_LOCK_DIR")]
    pub lock_dir: Option<PathBuf>,
    /// Log size in bytes that triggers rotation
    #[arg(long, env = "RUNGUARD_MAX_LOG_BYTES", default_value_t = DEFAULT_MAX_LOG_BYTES)]
    pub max_log_bytes: u64,
    /// Number of rotated log files to keep
    #[arg(long, env = "RUNGUARD_LOG_BACKUPS", default_value_t = DEFAULT_LOG_BACKUPS)]
    pub log_backups: usize,
}

impl GuardOptions {
    /// Build a config, naming the instance after `command` when no name was given
    pub fn to_config(&self, command: Option<&str>) -> Result<Config> {
        let identity = match (&self.name, command) {
            (Some(name), _) => name.clone(),
            (None, Some(command)) => identity_from_command(command)?,
            (None, None) => {
                return Err(RunGuardError::Config(
                    "--name is required when no command is given".to_string(),
                ));
            }
        };

        let mut config = Config::new(&identity)?
            .enable_logging(self.enable_logging)
            .max_log_bytes(self.max_log_bytes)?
            .log_backups(self.log_backups);
        if let Some(dir) = &self.log_dir {
            config = config.log_dir(dir);
        }
        if let Some(dir) = &self.lock_dir {
            config = config.lock_dir(dir);
        }
        Ok(config)
    }
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a command under the instance lock
    Run {
        #[command(flatten)]
        options: GuardOptions,
        /// Command that must be on PATH before running (repeatable)
        #[arg(long = "require", value_name = "COMMAND")]
        require: Vec<String>,
        /// Command and its arguments
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Show lock holder and log files
    Status {
        #[command(flatten)]
        options: GuardOptions,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show instance logs
    Logs {
        #[command(flatten)]
        options: GuardOptions,
        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
        /// Rotated generation to read (1 is the most recent backup)
        #[arg(short, long)]
        generation: Option<usize>,
        /// Follow logs in real-time (like tail -f)
        #[arg(short, long)]
        follow: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_keeps_command_arguments_verbatim() {
        let cli = parse(&["runguard", "run", "--name", "sync", "--", "rsync", "-av", "--delete"]);
        match cli.command {
            Commands::Run { options, command, .. } => {
                assert_eq!(options.name.as_deref(), Some("sync"));
                assert_eq!(command, vec!["rsync", "-av", "--delete"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn identity_defaults_to_command_name() {
        let cli = parse(&["runguard", "run", "/opt/jobs/backup.sh"]);
        let Commands::Run { options, command, .. } = cli.command else {
            panic!("expected run");
        };
        let config = options.to_config(command.first().map(String::as_str)).unwrap();
        assert_eq!(config.identity, "backup");
        assert!(!config.log.enabled);
    }

    #[test]
    fn log_dir_flag_enables_persistence() {
        let cli = parse(&["runguard", "status", "--name", "sync", "--log-dir", "/tmp/rg-logs"]);
        let Commands::Status { options, .. } = cli.command else {
            panic!("expected status");
        };
        let config = options.to_config(None).unwrap();
        assert!(config.log.enabled);
        assert_eq!(config.log.directory, PathBuf::from("/tmp/rg-logs"));
    }

    #[test]
    fn status_without_name_is_rejected() {
        let cli = parse(&["runguard", "status"]);
        let Commands::Status { options, .. } = cli.command else {
            panic!("expected status");
        };
        assert!(options.to_config(None).is_err());
    }

    #[test]
    fn run_requires_a_command() {
        assert!(Cli::try_parse_from(["runguard", "run"]).is_err());
    }
}
