//! Check command - prints the verdict for a command without running it.

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use termgate_sandbox::Verdict;

use super::Context;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Command line to check
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckOutput<'a> {
    command: &'a str,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// Run the check command. Exits non-zero when the command is denied.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let command = args.command.join(" ");
    let session = ctx.session()?;
    let verdict = session.check(&command);

    if args.json {
        let output = CheckOutput {
            command: &command,
            allowed: verdict.is_allowed(),
            kind: verdict.execution_kind().map(|k| k.label()),
            reason: verdict.deny_reason().map(|r| r.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", verdict);
        if ctx.verbose {
            println!("  cwd: {}", session.working_directory().path().display());
            match ctx.config.boundary.as_deref() {
                Some(boundary) => println!("  boundary: {}", boundary.display()),
                None => println!("  boundary: (none)"),
            }
        }
    }

    if let Verdict::Denied(reason) = verdict {
        bail!("command denied: {}", reason);
    }
    Ok(())
}
