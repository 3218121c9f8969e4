//! Command authorization for sandboxed shell access.
//!
//! Decides whether a command string requested by an automated caller may run,
//! and if so how. A command is allowed only when it matches the allow-list and
//! every path argument the engine can identify resolves inside a fixed
//! boundary directory.
//!
//! # Security Model
//!
//! - **Allow-list**: a fixed, ordered rule table. First matching rule wins.
//! - **Containment**: lexical resolution against the session working
//!   directory, then a component-wise prefix check against the boundary.
//! - **Fail closed**: no boundary means no path-bearing command is allowed.
//! - **Known relaxation**: `npm create` / `yarn create` skip the path check
//!   unless disabled in [`SandboxConfig`].
//!
//! This is not a shell parser. Pipes, redirects and subshells are not
//! understood, and the execution itself is not isolated.
//!
//! # Example
//!
//! ```no_run
//! use termgate_sandbox::{SandboxConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SandboxConfig::default().with_boundary("/home/me/project");
//!     let mut session = Session::from_process(&config)?;
//!
//!     println!("{}", session.check("git status --short"));
//!     session.mkdir("src/components").await?;
//!     session.cd("src").await?;
//!
//!     let output = session.execute_command("git status").await?;
//!     println!("{}", output.stdout);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod executor;
mod gateway;
mod path;
mod policy;
mod session;
mod verdict;

pub use config::{ALLOWED_DIRECTORY_ENV, DEFAULT_TIMEOUT, SandboxConfig};
pub use error::{ErrorKind, SandboxError, SandboxResult};
pub use executor::{CommandExecutor, CommandOutput};
pub use gateway::{AuthorizationGateway, PATCH_COMMAND};
pub use path::{PathSandbox, WorkingDirectory, normalize_path};
pub use policy::{CommandPolicy, CustomRule, DEFAULT_RULES, DirectoryCommand, MatchKind, Rule};
pub use session::Session;
pub use verdict::{DenyReason, DirectoryOp, ExecutionKind, Verdict};
