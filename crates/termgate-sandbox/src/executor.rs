//! Process execution for authorized commands.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};

/// Output from a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
    /// Whether the command succeeded (exit code 0).
    pub success: bool,
}

impl CommandOutput {
    /// Create a new command output.
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            success: exit_code == 0,
            exit_code,
        }
    }

    /// Output for an operation performed in-process.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(text.into(), String::new(), 0)
    }
}

/// Runs authorized commands.
///
/// The executor never decides anything: callers must hold an `Allowed`
/// verdict for the command before calling in.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    shell: String,
    timeout: Duration,
    env_vars: Vec<(String, String)>,
}

impl CommandExecutor {
    /// Create an executor from configuration.
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            timeout: config.timeout,
            env_vars: config.env_vars.clone(),
        }
    }

    /// Run a command string through the shell in `cwd`.
    pub async fn run_shell(&self, command: &str, cwd: &Path) -> SandboxResult<CommandOutput> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        self.prepare(&mut cmd, cwd);
        cmd.stdin(Stdio::null());

        tracing::debug!(shell = %self.shell, command, cwd = %cwd.display(), "spawning shell command");

        let child = cmd.spawn().map_err(|source| SandboxError::SpawnFailed {
            command: command.to_string(),
            source,
        })?;
        self.collect(command, child).await
    }

    /// Spawn `program` with `args` in `cwd` and stream `input` over stdin.
    ///
    /// Stdin is closed once the input is written.
    pub async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
        cwd: &Path,
    ) -> SandboxResult<CommandOutput> {
        let command_line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");

        let mut cmd = Command::new(program);
        cmd.args(args);
        self.prepare(&mut cmd, cwd);
        cmd.stdin(Stdio::piped());

        tracing::debug!(command = %command_line, bytes = input.len(), cwd = %cwd.display(), "spawning with piped stdin");

        let mut child = cmd.spawn().map_err(|source| SandboxError::SpawnFailed {
            command: command_line.clone(),
            source,
        })?;

        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_owned();
            tokio::spawn(async move {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await
            })
        });

        let output = self.collect(&command_line, child).await;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to write to child stdin"),
                Err(e) => tracing::warn!(error = %e, "stdin writer task failed"),
            }
        }

        output
    }

    /// Recursively create every path. Existing directories are fine.
    ///
    /// With a `mode`, each listed path gets those permission bits afterwards.
    /// Intermediate parents keep the default.
    pub async fn make_dirs(
        &self,
        paths: &[PathBuf],
        mode: Option<u32>,
    ) -> SandboxResult<CommandOutput> {
        for path in paths {
            tokio::fs::create_dir_all(path).await.map_err(|e| {
                SandboxError::path(path, format!("Failed to create directory ({})", e))
            })?;
            if let Some(mode) = mode {
                set_mode(path, mode).await?;
            }
            tracing::debug!(path = %path.display(), mode = ?mode.map(|m| format!("{:o}", m)), "directory created");
        }
        let listed = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(CommandOutput::message(format!(
            "Directory created successfully: {}",
            listed
        )))
    }

    /// Verify that `path` is an existing directory.
    pub async fn ensure_directory(&self, path: &Path) -> SandboxResult<()> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            SandboxError::path(path, format!("Failed to change directory ({})", e))
        })?;
        if !metadata.is_dir() {
            return Err(SandboxError::path(
                path,
                "Failed to change directory (not a directory)",
            ));
        }
        Ok(())
    }

    fn prepare(&self, cmd: &mut Command, cwd: &Path) {
        cmd.current_dir(cwd);
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
    }

    async fn collect(
        &self,
        command: &str,
        child: tokio::process::Child,
    ) -> SandboxResult<CommandOutput> {
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(command, timeout = ?self.timeout, "command timed out");
                return Err(SandboxError::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            tracing::debug!(command, exit_code, "command failed");
            return Err(SandboxError::ExecutionFailed {
                command: command.to_string(),
                exit_code,
                stderr,
            });
        }

        Ok(CommandOutput::new(stdout, stderr, exit_code))
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> SandboxResult<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| SandboxError::path(path, format!("Failed to set directory mode ({})", e)))
}

#[cfg(not(unix))]
async fn set_mode(path: &Path, mode: u32) -> SandboxResult<()> {
    tracing::warn!(path = %path.display(), mode = format!("{:o}", mode), "directory modes are not supported on this platform");
    Ok(())
}
