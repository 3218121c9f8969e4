//! Authorization verdicts.

use std::fmt;
use std::path::PathBuf;

/// A directory side effect the executor performs itself instead of shelling out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOp {
    /// Change the session working directory to the resolved path.
    ChangeDir(PathBuf),
    /// Recursively create every resolved path, optionally with an octal mode.
    MakeDir { paths: Vec<PathBuf>, mode: Option<u32> },
}

/// How an allowed command must be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionKind {
    /// Run the command string through a shell.
    Plain,
    /// Perform a directory side effect on already resolved paths.
    DirectoryMutation(DirectoryOp),
    /// Spawn the program with an argument vector and stream input over stdin.
    StdinPiped,
}

impl ExecutionKind {
    /// Short label used in log fields and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionKind::Plain => "plain",
            ExecutionKind::DirectoryMutation(_) => "directory-mutation",
            ExecutionKind::StdinPiped => "stdin-piped",
        }
    }
}

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No rule in the allow-list matched.
    NotInAllowList,
    /// A path argument resolved outside the sandbox boundary.
    PathOutsideSandbox { path: PathBuf },
    /// A directory command carried no path argument.
    MissingPathArgument,
    /// A `sed` invocation could not be safely interpreted.
    MalformedSed(String),
    /// An option value the executor cannot honor.
    InvalidArgument(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NotInAllowList => write!(f, "not in allow-list"),
            DenyReason::PathOutsideSandbox { path } => {
                write!(f, "path outside sandbox: {}", path.display())
            }
            DenyReason::MissingPathArgument => write!(f, "missing path argument"),
            DenyReason::MalformedSed(detail) => write!(f, "malformed sed invocation: {}", detail),
            DenyReason::InvalidArgument(detail) => write!(f, "invalid argument: {}", detail),
        }
    }
}

/// Result of authorizing one command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed(ExecutionKind),
    Denied(DenyReason),
}

impl Verdict {
    /// Check if the command was allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed(_))
    }

    /// The execution kind, if allowed.
    pub fn execution_kind(&self) -> Option<&ExecutionKind> {
        match self {
            Verdict::Allowed(kind) => Some(kind),
            Verdict::Denied(_) => None,
        }
    }

    /// The denial reason, if denied.
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Verdict::Allowed(_) => None,
            Verdict::Denied(reason) => Some(reason),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allowed(kind) => write!(f, "allowed ({})", kind.label()),
            Verdict::Denied(reason) => write!(f, "denied: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_accessors() {
        let allowed = Verdict::Allowed(ExecutionKind::Plain);
        assert!(allowed.is_allowed());
        assert_eq!(allowed.execution_kind(), Some(&ExecutionKind::Plain));
        assert!(allowed.deny_reason().is_none());

        let denied = Verdict::Denied(DenyReason::MissingPathArgument);
        assert!(!denied.is_allowed());
        assert!(denied.execution_kind().is_none());
        assert_eq!(denied.to_string(), "denied: missing path argument");

        let mode = DenyReason::InvalidArgument("mkdir mode must be octal digits".into());
        assert_eq!(
            mode.to_string(),
            "invalid argument: mkdir mode must be octal digits"
        );
    }
}
