//! termgate - sandboxed command authorization served over MCP.
//!
//! Main entry point for the termgate CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{check, rules, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// termgate - run allow-listed commands inside a sandbox directory
#[derive(Parser)]
#[command(name = "termgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Sandbox boundary; path arguments must stay inside it
    #[arg(long, global = true, env = "ALLOWED_DIRECTORY")]
    pub allowed_dir: Option<PathBuf>,

    /// Timeout for each command, in seconds
    #[arg(long, global = true, env = "TERMGATE_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,

    /// Deny `npm create` / `yarn create` unless they pass the normal checks
    #[arg(long, global = true)]
    pub no_scaffold_bypass: bool,

    /// Extra environment variable for spawned commands (repeatable)
    #[arg(long = "env", global = true, value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Directory for rotating JSON log files
    #[arg(long, global = true, env = "TERMGATE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve MCP over stdio (the default)
    Serve(serve::ServeArgs),

    /// Show the verdict for a command without running it
    Check(check::CheckArgs),

    /// List the allow-list rules
    Rules(rules::RulesArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads env-backed flags.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        "termgate=debug,termgate_sandbox=debug,termgate_mcp=debug,info"
    } else {
        "termgate=info,termgate_sandbox=info,termgate_mcp=info,warn"
    };

    // stdout carries the protocol, so console logs go to stderr.
    let (file_layer, _guard) = match &cli.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "termgate.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "termgate=trace,termgate_sandbox=trace,termgate_mcp=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
                ),
        )
        .with(file_layer)
        .init();

    let ctx = commands::Context::from_cli(&cli);

    match cli.command {
        None => serve::run(serve::ServeArgs::default(), &ctx).await,
        Some(Commands::Serve(args)) => serve::run(args, &ctx).await,
        Some(Commands::Check(args)) => check::run(args, &ctx).await,
        Some(Commands::Rules(args)) => rules::run(args, &ctx).await,
    }
}
