//! Authorization entry point.

use std::path::Path;

use crate::path::{PathSandbox, WorkingDirectory};
use crate::policy::{CommandPolicy, DirectoryCommand, directory_verdict};
use crate::verdict::{DenyReason, DirectoryOp, ExecutionKind, Verdict};

/// Command used for patches streamed over stdin.
pub const PATCH_COMMAND: &str = "git apply";

/// Decides whether a command may run in the current working directory.
///
/// `cd` and `mkdir` are decided purely by path containment; everything else
/// goes through the [`CommandPolicy`] table. Nothing is cached: the same
/// command can get a different verdict after the working directory changes.
#[derive(Debug, Clone)]
pub struct AuthorizationGateway {
    sandbox: PathSandbox,
    policy: CommandPolicy,
}

impl AuthorizationGateway {
    /// Create a gateway from a sandbox and a policy.
    pub fn new(sandbox: PathSandbox, policy: CommandPolicy) -> Self {
        Self { sandbox, policy }
    }

    /// The path sandbox.
    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// The command policy.
    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    /// Authorize a raw command string.
    pub fn authorize(&self, command: &str, cwd: &WorkingDirectory) -> Verdict {
        let base = command.split_whitespace().next().unwrap_or_default();
        let verdict = match DirectoryCommand::from_base(base) {
            Some(dir) => directory_verdict(dir, command, &self.sandbox, cwd.path()),
            None => self.policy.decide(command, &self.sandbox, cwd.path()),
        };
        log_verdict(command, cwd.path(), &verdict);
        verdict
    }

    /// Authorize a directory operation on a single raw path argument.
    pub fn authorize_directory(
        &self,
        dir: DirectoryCommand,
        path: &str,
        cwd: &WorkingDirectory,
    ) -> Verdict {
        let verdict = if path.trim().is_empty() {
            Verdict::Denied(DenyReason::MissingPathArgument)
        } else {
            match self.sandbox.check(path, cwd) {
                Ok(resolved) => {
                    let op = match dir {
                        DirectoryCommand::ChangeDir => DirectoryOp::ChangeDir(resolved),
                        DirectoryCommand::MakeDir => DirectoryOp::MakeDir {
                            paths: vec![resolved],
                            mode: None,
                        },
                    };
                    Verdict::Allowed(ExecutionKind::DirectoryMutation(op))
                }
                Err(reason) => Verdict::Denied(reason),
            }
        };
        tracing::debug!(
            op = dir.name(),
            path,
            cwd = %cwd.path().display(),
            %verdict,
            "directory authorization"
        );
        verdict
    }

    /// Authorize a `git apply` that will receive its patch over stdin.
    pub fn authorize_patch(&self, cwd: &WorkingDirectory) -> Verdict {
        match self.authorize(PATCH_COMMAND, cwd) {
            Verdict::Allowed(ExecutionKind::Plain) => Verdict::Allowed(ExecutionKind::StdinPiped),
            other => other,
        }
    }
}

fn log_verdict(command: &str, cwd: &Path, verdict: &Verdict) {
    match verdict {
        Verdict::Allowed(kind) => tracing::info!(
            command,
            cwd = %cwd.display(),
            kind = kind.label(),
            "command authorized"
        ),
        Verdict::Denied(reason) => tracing::info!(
            command,
            cwd = %cwd.display(),
            %reason,
            "command denied"
        ),
    }
}
