use super::demo::cmd_demo;
use super::env::CliArgs;
use super::info::cmd_info;
use super::run::cmd_run;
use super::sites::cmd_sites;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, cli.output.clone()).await,
        Commands::Demo(args) => cmd_demo(args, ctx, cli.output.clone()).await,
        Commands::Sites(args) => cmd_sites(args, ctx, cli.output.clone()),
        Commands::Info => cmd_info(ctx, cli.output.clone()),
    }
}
