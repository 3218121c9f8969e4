//! A caller session: working directory plus authorization and execution.

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::executor::{CommandExecutor, CommandOutput};
use crate::gateway::{AuthorizationGateway, PATCH_COMMAND};
use crate::path::WorkingDirectory;
use crate::policy::DirectoryCommand;
use crate::verdict::{DirectoryOp, ExecutionKind, Verdict};

/// One caller's view of the sandbox.
///
/// Every operation takes `&mut self`, so authorization and execution for a
/// session never interleave. The working directory lives here rather than in
/// the process; the server's own cwd is never changed.
#[derive(Debug)]
pub struct Session {
    gateway: AuthorizationGateway,
    executor: CommandExecutor,
    cwd: WorkingDirectory,
}

impl Session {
    /// Create a session starting in `cwd`.
    pub fn new(config: &SandboxConfig, cwd: WorkingDirectory) -> Self {
        Self {
            gateway: config.gateway(),
            executor: CommandExecutor::new(config),
            cwd,
        }
    }

    /// Create a session starting in the process working directory.
    pub fn from_process(config: &SandboxConfig) -> std::io::Result<Self> {
        Ok(Self::new(config, WorkingDirectory::from_process()?))
    }

    /// The authorization gateway.
    pub fn gateway(&self) -> &AuthorizationGateway {
        &self.gateway
    }

    /// The current working directory.
    pub fn working_directory(&self) -> &WorkingDirectory {
        &self.cwd
    }

    /// Authorize without executing.
    pub fn check(&self, command: &str) -> Verdict {
        self.gateway.authorize(command, &self.cwd)
    }

    /// Authorize and run a raw command string.
    pub async fn execute_command(&mut self, command: &str) -> SandboxResult<CommandOutput> {
        if command.trim().is_empty() {
            return Err(SandboxError::validation("command must not be empty"));
        }
        let verdict = self.gateway.authorize(command, &self.cwd);
        self.run(command, verdict, None).await
    }

    /// Create a directory (and its parents) inside the sandbox.
    pub async fn mkdir(&mut self, path: &str) -> SandboxResult<CommandOutput> {
        let verdict = self
            .gateway
            .authorize_directory(DirectoryCommand::MakeDir, path, &self.cwd);
        self.run(path, verdict, None).await
    }

    /// Change the session working directory.
    pub async fn cd(&mut self, path: &str) -> SandboxResult<CommandOutput> {
        let verdict = self
            .gateway
            .authorize_directory(DirectoryCommand::ChangeDir, path, &self.cwd);
        self.run(path, verdict, None).await
    }

    /// Apply a patch with `git apply`, streaming it over stdin.
    pub async fn apply_patch(&mut self, patch: &str) -> SandboxResult<CommandOutput> {
        if patch.trim().is_empty() {
            return Err(SandboxError::validation("patch must not be empty"));
        }
        let verdict = self.gateway.authorize_patch(&self.cwd);
        self.run(PATCH_COMMAND, verdict, Some(patch)).await
    }

    async fn run(
        &mut self,
        command: &str,
        verdict: Verdict,
        input: Option<&str>,
    ) -> SandboxResult<CommandOutput> {
        let kind = match verdict {
            Verdict::Allowed(kind) => kind,
            Verdict::Denied(reason) => return Err(SandboxError::denied(command, reason)),
        };

        match kind {
            ExecutionKind::Plain => self.executor.run_shell(command, self.cwd.path()).await,
            ExecutionKind::DirectoryMutation(op) => self.apply_directory(op).await,
            ExecutionKind::StdinPiped => {
                let input = input.ok_or_else(|| {
                    SandboxError::validation("stdin-piped command requires input")
                })?;
                let mut argv = command.split_whitespace();
                let program = argv.next().unwrap_or_default();
                let args: Vec<&str> = argv.collect();
                self.executor
                    .run_with_stdin(program, &args, input, self.cwd.path())
                    .await
            }
        }
    }

    async fn apply_directory(&mut self, op: DirectoryOp) -> SandboxResult<CommandOutput> {
        match op {
            DirectoryOp::MakeDir { paths, mode } => self.executor.make_dirs(&paths, mode).await,
            DirectoryOp::ChangeDir(path) => {
                self.executor.ensure_directory(&path).await?;
                tracing::info!(
                    from = %self.cwd.path().display(),
                    to = %path.display(),
                    "working directory changed"
                );
                let message = format!("Changed directory to: {}", path.display());
                self.cwd.set(path);
                Ok(CommandOutput::message(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::verdict::DenyReason;
    use std::path::Path;

    fn session(root: &Path) -> Session {
        let config = SandboxConfig::new()
            .with_boundary(root)
            .with_shell("/bin/sh");
        Session::new(&config, WorkingDirectory::new(root))
    }

    #[tokio::test]
    async fn test_cd_updates_working_directory() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp.path().join("src")).unwrap();
        let mut s = session(temp.path());

        let output = s.cd("src").await.unwrap();
        assert!(output.stdout.starts_with("Changed directory to:"));
        assert_eq!(s.working_directory().path(), temp.path().join("src"));

        // Relative checks now start from src.
        assert!(s.check("mkdir ../docs").is_allowed());
        assert!(!s.check("mkdir ../../outside").is_allowed());
    }

    #[tokio::test]
    async fn test_failed_cd_keeps_working_directory() {
        let temp = tempfile::tempdir().unwrap();
        let mut s = session(temp.path());

        let err = s.cd("does-not-exist").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Path);
        assert_eq!(s.working_directory().path(), temp.path());

        let err = s.cd("..").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        assert_eq!(s.working_directory().path(), temp.path());
    }

    #[tokio::test]
    async fn test_mkdir_twice_succeeds() {
        let temp = tempfile::tempdir().unwrap();
        let mut s = session(temp.path());

        s.execute_command("mkdir -p build/out").await.unwrap();
        s.execute_command("mkdir -p build/out").await.unwrap();
        s.mkdir("build/out").await.unwrap();
        assert!(temp.path().join("build/out").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mkdir_mode_is_applied() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let mut s = session(temp.path());

        s.execute_command("mkdir -pm 700 secrets").await.unwrap();
        let mode = std::fs::metadata(temp.path().join("secrets"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);

        let err = s.execute_command("mkdir -m u+rwx other").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        assert!(!temp.path().join("other").exists());
    }

    #[tokio::test]
    async fn test_cd_via_command_string() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp.path().join("pkg")).unwrap();
        let mut s = session(temp.path());

        s.execute_command("cd pkg").await.unwrap();
        assert_eq!(s.working_directory().path(), temp.path().join("pkg"));
    }

    #[tokio::test]
    async fn test_denied_command_is_not_run() {
        let temp = tempfile::tempdir().unwrap();
        let mut s = session(temp.path());

        let err = s.execute_command("touch pwned.txt").await.unwrap_err();
        assert_eq!(err.deny_reason(), Some(&DenyReason::NotInAllowList));
        assert!(!temp.path().join("pwned.txt").exists());

        let err = s.mkdir("/definitely/outside").await.unwrap_err();
        assert!(matches!(
            err.deny_reason(),
            Some(DenyReason::PathOutsideSandbox { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sed_cannot_reach_home_through_expansion() {
        let sandbox = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let victim = home.path().join("victim.txt");
        std::fs::write(&victim, "aaa\n").unwrap();

        let config = SandboxConfig::new()
            .with_boundary(sandbox.path())
            .with_shell("/bin/sh")
            .add_env("HOME", home.path().to_string_lossy());
        let mut s = Session::new(&config, WorkingDirectory::new(sandbox.path()));

        for command in [
            "sed -i 's/a/c/' ~/victim.txt",
            "sed -i 's/a/c/' $HOME/victim.txt",
            "sed -i 's/a/c/' \"${HOME}/victim.txt\"",
        ] {
            assert!(!s.check(command).is_allowed(), "{command}");
            let err = s.execute_command(command).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        }
        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "aaa\n");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let temp = tempfile::tempdir().unwrap();
        let mut s = session(temp.path());

        assert_eq!(
            s.execute_command("   ").await.unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            s.apply_patch("").await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn test_no_boundary_denies_directory_ops() {
        let temp = tempfile::tempdir().unwrap();
        let config = SandboxConfig::new();
        let mut s = Session::new(&config, WorkingDirectory::new(temp.path()));

        let err = s.mkdir("a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        assert!(!temp.path().join("a").exists());
    }
}
