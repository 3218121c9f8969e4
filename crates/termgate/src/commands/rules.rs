//! Rules command - lists the active allow-list.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the rules command.
#[derive(Args, Debug)]
pub struct RulesArgs {}

/// Run the rules command.
pub async fn run(_args: RulesArgs, ctx: &Context) -> Result<()> {
    let gateway = ctx.config.gateway();
    let policy = gateway.policy();

    for rule in policy.rules() {
        println!("{}", rule);
    }

    if !policy.scaffold_bypass() {
        println!();
        println!("scaffold bypass disabled");
    }
    Ok(())
}
