use clap::Subcommand;

use super::demo::DemoArgs;
use super::run::RunArgs;
use super::sites::SitesArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Launch Chromium on a booking page and run the automation
    Run(RunArgs),

    /// Run the full flow against the built-in mock ticket page
    Demo(DemoArgs),

    /// Inspect the site tables
    Sites(SitesArgs),

    /// Show version and build information
    Info,
}
