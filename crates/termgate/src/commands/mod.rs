//! CLI command handlers.

pub mod check;
pub mod rules;
pub mod serve;

use std::time::Duration;

use termgate_sandbox::{SandboxConfig, Session};

use crate::Cli;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Sandbox configuration built from flags and environment.
    pub config: SandboxConfig,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Build the context from parsed arguments.
    pub fn from_cli(cli: &Cli) -> Self {
        let mut config = SandboxConfig::new()
            .with_timeout(Duration::from_secs(cli.timeout_secs))
            .with_scaffold_bypass(!cli.no_scaffold_bypass);
        if let Some(dir) = &cli.allowed_dir {
            config = config.with_boundary(dir);
        }
        for (key, value) in &cli.env {
            config = config.add_env(key, value);
        }

        Self {
            config,
            verbose: cli.verbose,
        }
    }

    /// Open a session rooted at the process working directory.
    pub fn session(&self) -> anyhow::Result<Session> {
        Ok(Session::from_process(&self.config)?)
    }
}
