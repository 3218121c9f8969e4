//! Sandbox configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::AuthorizationGateway;
use crate::path::PathSandbox;
use crate::policy::CommandPolicy;

/// Environment variable holding the sandbox boundary.
pub const ALLOWED_DIRECTORY_ENV: &str = "ALLOWED_DIRECTORY";

/// Default timeout for shell commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for authorization and execution.
///
/// # Security Model
///
/// - **Boundary**: the only directory tree path arguments may point into.
///   Missing, empty or relative means nothing is allowed that needs a path.
/// - **Scaffold bypass**: `npm create` / `yarn create` skip the path check.
///   Enabled by default, logged every time it is used.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Sandbox boundary directory.
    pub boundary: Option<PathBuf>,

    /// Command timeout.
    pub timeout: Duration,

    /// Shell used for plain commands.
    pub shell: String,

    /// Environment variables to pass to commands.
    pub env_vars: Vec<(String, String)>,

    /// Allow `npm create` / `yarn create` without a path check.
    pub scaffold_bypass: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            boundary: None,
            timeout: DEFAULT_TIMEOUT,
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
            env_vars: Vec::new(),
            scaffold_bypass: true,
        }
    }
}

impl SandboxConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sandbox boundary.
    pub fn with_boundary(mut self, boundary: impl Into<PathBuf>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Set the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the shell used for plain commands.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Add an environment variable.
    pub fn add_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Enable or disable the scaffolding relaxation.
    pub fn with_scaffold_bypass(mut self, enabled: bool) -> Self {
        self.scaffold_bypass = enabled;
        self
    }

    /// Build the path sandbox described by this configuration.
    pub fn sandbox(&self) -> PathSandbox {
        match &self.boundary {
            Some(boundary) => PathSandbox::new(boundary),
            None => {
                tracing::warn!(
                    env = ALLOWED_DIRECTORY_ENV,
                    "no sandbox boundary configured; path-bearing commands will be denied"
                );
                PathSandbox::unbounded()
            }
        }
    }

    /// Build the authorization gateway described by this configuration.
    pub fn gateway(&self) -> AuthorizationGateway {
        AuthorizationGateway::new(
            self.sandbox(),
            CommandPolicy::new().with_scaffold_bypass(self.scaffold_bypass),
        )
    }
}
