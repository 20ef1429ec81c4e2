use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct SitesArgs {
    #[command(subcommand)]
    pub command: SitesCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum SitesCommand {
    /// List known sites and how URLs are matched to them
    List,

    /// Print one site table
    Show {
        /// Site name
        name: String,
    },
}

pub fn cmd_sites(args: SitesArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let sites = ctx.sites();
    match args.command {
        SitesCommand::List => {
            let rows: Vec<_> = sites
                .sites()
                .map(|site| {
                    json!({
                        "name": site.name,
                        "urlContains": site.matching.url_contains,
                        "hosts": site.matching.hosts,
                    })
                })
                .collect();
            if print_structured(&rows, &output)? {
                return Ok(());
            }
            println!("Known sites:");
            for site in sites.sites() {
                let mut markers = site.matching.url_contains.clone();
                markers.extend(site.matching.hosts.iter().cloned());
                println!("  {:<12} {}", site.name, markers.join(", "));
            }
        }
        SitesCommand::Show { name } => {
            let site = sites.require(&name)?;
            if !print_structured(site, &output)? {
                print!("{}", serde_yaml::to_string(site)?);
            }
        }
    }
    Ok(())
}
