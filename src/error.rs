use std::fmt;

/// Custom error type for runguard operations
#[derive(Debug)]
pub enum RunGuardError {
    /// I/O operation failed
    Io(std::io::Error),
    /// JSON serialization failed
    Json(serde_json::Error),
    /// Another live instance holds the lock
    AlreadyRunning { pid: u32 },
    /// Log directory could not be created or written
    LogDirectoryUnavailable(String),
    /// A rotation step failed part way through
    RotationFailure(String),
    /// The wrapped job failed
    UserLogicFailure {
        step: String,
        code: Option<i32>,
    },
    /// Interrupted by an OS signal
    UnexpectedSignal(i32),
    /// A required command is not available
    DependencyMissing(String),
    /// Configuration error
    Config(String),
}

impl RunGuardError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RunGuardError::AlreadyRunning { .. } => crate::constants::EXIT_ALREADY_RUNNING,
            RunGuardError::UserLogicFailure { code, .. } => {
                code.unwrap_or(crate::constants::EXIT_DEFAULT_FAILURE)
            }
            RunGuardError::UnexpectedSignal(signo) => 128 + signo,
            RunGuardError::DependencyMissing(_) => crate::constants::EXIT_DEPENDENCY_MISSING,
            _ => crate::constants::EXIT_DEFAULT_FAILURE,
        }
    }
}

impl fmt::Display for RunGuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunGuardError::Io(err) => write!(f, "I/O error: {}", err),
            RunGuardError::Json(err) => write!(f, "JSON error: {}", err),
            RunGuardError::AlreadyRunning { pid } => {
                write!(f, "Another instance is already running (PID {})", pid)
            }
            RunGuardError::LogDirectoryUnavailable(msg) => {
                write!(f, "Log directory unavailable: {}", msg)
            }
            RunGuardError::RotationFailure(msg) => write!(f, "Log rotation failed: {}", msg),
            RunGuardError::UserLogicFailure { step, code: Some(code) } => {
                write!(f, "Step '{}' failed with exit code {}", step, code)
            }
            RunGuardError::UserLogicFailure { step, code: None } => {
                write!(f, "Step '{}' failed without an exit code", step)
            }
            RunGuardError::UnexpectedSignal(signo) => write!(f, "Interrupted by signal {}", signo),
            RunGuardError::DependencyMissing(name) => {
                write!(f, "Required command not found: {}", name)
            }
            RunGuardError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RunGuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunGuardError::Io(err) => Some(err),
            RunGuardError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RunGuardError {
    fn from(err: std::io::Error) -> Self {
        RunGuardError::Io(err)
    }
}

impl From<serde_json::Error> for RunGuardError {
    fn from(err: serde_json::Error) -> Self {
        RunGuardError::Json(err)
    }
}

/// Result type alias for runguard operations
pub type Result<T> = std::result::Result<T, RunGuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(RunGuardError::AlreadyRunning { pid: 42 }.exit_code(), 1);
        assert_eq!(
            RunGuardError::UserLogicFailure { step: "build".into(), code: Some(3) }.exit_code(),
            3
        );
        assert_eq!(
            RunGuardError::UserLogicFailure { step: "build".into(), code: None }.exit_code(),
            1
        );
        assert_eq!(RunGuardError::DependencyMissing("jq".into()).exit_code(), 127);
        assert_eq!(RunGuardError::UnexpectedSignal(15).exit_code(), 143);
    }

    #[test]
    fn display_names_the_failing_step() {
        let err = RunGuardError::UserLogicFailure { step: "deploy".into(), code: Some(2) };
        assert_eq!(err.to_string(), "Step 'deploy' failed with exit code 2");
    }
}
