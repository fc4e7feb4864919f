//! Lifecycle controller for runguard
//!
//! Sequencing for one guarded run: take the instance lock, check required
//! commands, run the job, and release the lock on every way out, including
//! OS termination signals.

use crate::config::Config;
use crate::error::{Result, RunGuardError};
use crate::lock::InstanceGuard;
use crate::logs::{Console, Logger};
use crate::process::{LivenessProbe, find_in_path, signal_name};
use std::future::Future;
use std::process::ExitStatus;
use std::sync::Arc;

/// How a guarded run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed { code: i32 },
    Signalled(i32),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Completed => 0,
            Outcome::Failed { code } => *code,
            Outcome::Signalled(signo) => RunGuardError::UnexpectedSignal(*signo).exit_code(),
        }
    }
}

/// A run that holds the instance lock
pub struct Lifecycle {
    config: Config,
    logger: Arc<Logger>,
    guard: Option<InstanceGuard>,
    signals: Option<ShutdownSignals>,
}

impl Lifecycle {
    /// Configure logging, listen for termination signals, and take the instance lock.
    ///
    /// Signal handlers go in before the lock so that an interrupt arriving
    /// between acquire and [`Lifecycle::run`] still reaches the cleanup path.
    /// Must be called from within a tokio runtime.
    /// A refused lock is logged once at ERROR before the error is returned.
    pub fn start(
        config: Config,
        console: Arc<dyn Console>,
        probe: &dyn LivenessProbe,
    ) -> Result<Self> {
        let logger = Arc::new(Logger::new(config.log.clone(), console));

        let signals = match ShutdownSignals::install() {
            Ok(signals) => Some(signals),
            Err(e) => {
                logger.warn(format!(
                    "Could not install signal handlers ({}); lock cleanup relies on normal exit",
                    e
                ));
                None
            }
        };

        match InstanceGuard::acquire(config.lock_path(), logger.clone(), probe) {
            Ok(guard) => Ok(Self {
                config,
                logger,
                guard: Some(guard),
                signals,
            }),
            Err(err) => {
                logger.error(format!("{}; exiting", err));
                Err(err)
            }
        }
    }

    pub fn logger(&self) -> Arc<Logger> {
        self.logger.clone()
    }

    /// Every command in `commands` must be resolvable before the job runs
    pub fn check_dependencies(&self, commands: &[String]) -> Result<()> {
        for command in commands {
            if find_in_path(command).is_none() {
                let err = RunGuardError::DependencyMissing(command.clone());
                self.logger.error(err.to_string());
                return Err(err);
            }
        }
        Ok(())
    }

    /// Run `job` until it finishes or a termination signal arrives
    pub async fn run<J>(mut self, job: J) -> Outcome
    where
        J: Future<Output = Result<()>>,
    {
        let signals = self.signals.take();
        let shutdown = async move {
            match signals {
                Some(mut signals) => signals.recv().await,
                None => std::future::pending().await,
            }
        };
        self.run_until(job, shutdown).await
    }

    /// Race `job` against `shutdown`, which resolves to a signal number.
    ///
    /// The job is dropped if `shutdown` wins. The lock is released before
    /// this returns, whichever way the race went.
    pub async fn run_until<J, S>(mut self, job: J, shutdown: S) -> Outcome
    where
        J: Future<Output = Result<()>>,
        S: Future<Output = i32>,
    {
        let outcome = tokio::select! {
            // A signal that is already pending wins over a finished job
            biased;

            signo = shutdown => {
                self.logger.error(format!(
                    "Received {} ({}); shutting down",
                    signal_name(signo),
                    signo
                ));
                Outcome::Signalled(signo)
            }
            result = job => match result {
                Ok(()) => {
                    self.logger.info(format!("{} completed successfully", self.config.identity));
                    Outcome::Completed
                }
                Err(err) => {
                    self.logger.error(err.to_string());
                    Outcome::Failed { code: err.exit_code() }
                }
            },
        };

        self.shutdown();
        outcome
    }

    /// Release the instance lock now instead of on drop
    pub fn shutdown(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Termination signal listeners, registered as soon as they are created
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignals {
    /// Register for SIGINT, SIGTERM and SIGHUP (Ctrl-C on Windows)
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
                hangup: signal(SignalKind::hangup())?,
            })
        }

        #[cfg(windows)]
        {
            Ok(Self {
                ctrl_c: tokio::signal::windows::ctrl_c()?,
            })
        }

        #[cfg(not(any(unix, windows)))]
        {
            Err(std::io::Error::other("signals are not supported on this platform"))
        }
    }

    /// Resolve with the number of the next termination signal
    pub async fn recv(&mut self) -> i32 {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => libc::SIGINT,
                _ = self.terminate.recv() => libc::SIGTERM,
                _ = self.hangup.recv() => libc::SIGHUP,
            }
        }

        #[cfg(windows)]
        {
            self.ctrl_c.recv().await;
            2
        }

        #[cfg(not(any(unix, windows)))]
        {
            std::future::pending().await
        }
    }
}

/// Run `command` as a child process; a non-zero exit becomes a job failure
pub async fn run_command(command: &[String], logger: Arc<Logger>) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| RunGuardError::Config("no command given".to_string()))?;
    let step = command.join(" ");

    logger.info(format!("Running: {}", step));

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RunGuardError::UserLogicFailure {
            step: format!("{} ({})", step, e),
            code: Some(if e.kind() == std::io::ErrorKind::NotFound {
                127
            } else {
                126
            }),
        })?;

    let status = child.wait().await.map_err(RunGuardError::Io)?;
    if status.success() {
        Ok(())
    } else {
        Err(RunGuardError::UserLogicFailure {
            step,
            code: exit_code_of(status),
        })
    }
}

/// Exit code of a finished child, using the shell's `128 + signo` for signal deaths
fn exit_code_of(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map(|signo| 128 + signo)
    }

    #[cfg(not(unix))]
    {
        None
    }
}
