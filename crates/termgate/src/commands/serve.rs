//! Serve command - runs the MCP server over stdio.

use anyhow::Result;
use clap::Args;
use termgate_mcp::{McpServer, StdioTransport};

use super::Context;

/// Arguments for the serve command.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {}

/// Run the serve command until stdin closes.
pub async fn run(_args: ServeArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    let mut server = McpServer::new(session);
    let mut transport = StdioTransport::stdio();

    server.serve(&mut transport).await?;
    Ok(())
}
