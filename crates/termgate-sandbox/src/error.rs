//! Error types for authorization and execution.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::verdict::DenyReason;

/// Broad category of a [`SandboxError`].
///
/// All categories reach the caller the same way (an error payload), but the
/// distinction is kept for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Arguments were malformed before authorization ran.
    Validation,
    /// The authorization engine denied the command.
    AuthorizationDenied,
    /// The downstream process failed to spawn, timed out or exited non-zero.
    Execution,
    /// A directory side effect failed after authorization succeeded.
    Path,
}

impl ErrorKind {
    /// Short label used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::AuthorizationDenied => "denied",
            ErrorKind::Execution => "execution",
            ErrorKind::Path => "path",
        }
    }
}

/// Errors that can occur while authorizing or executing a command.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Arguments did not have the expected shape.
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// The command was rejected by the authorization engine.
    #[error("Command not allowed: {reason}")]
    Denied { command: String, reason: DenyReason },

    /// The command could not be started.
    #[error("Failed to execute '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    /// The command ran and exited with a non-zero status.
    #[error("Command failed with exit code {exit_code}: {command}\n{stderr}")]
    ExecutionFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The command did not finish in time.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// A directory operation failed.
    #[error("{message}: {}", path.display())]
    Path { path: PathBuf, message: String },

    /// IO error while talking to a child process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a denial for the given command.
    pub fn denied(command: impl Into<String>, reason: DenyReason) -> Self {
        Self::Denied {
            command: command.into(),
            reason,
        }
    }

    /// Create a path error.
    pub fn path(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::Validation(_) => ErrorKind::Validation,
            SandboxError::Denied { .. } => ErrorKind::AuthorizationDenied,
            SandboxError::SpawnFailed { .. }
            | SandboxError::ExecutionFailed { .. }
            | SandboxError::Timeout(_)
            | SandboxError::Io(_) => ErrorKind::Execution,
            SandboxError::Path { .. } => ErrorKind::Path,
        }
    }

    /// The denial reason, if this is an authorization failure.
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            SandboxError::Denied { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
