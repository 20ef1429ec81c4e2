use anyhow::Result;
use serde_json::json;
use sword_core_types::StateId;

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};

pub fn cmd_info(ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = ctx.config();
    let sites: Vec<&str> = ctx.sites().names().collect();
    let states: Vec<&str> = StateId::ALL.iter().map(StateId::as_str).collect();

    let info = json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "buildDate": env!("BUILD_DATE"),
        "gitHash": env!("GIT_HASH"),
        "gitBranch": env!("GIT_BRANCH"),
        "configPath": ctx.config_path().display().to_string(),
        "stateFile": config.state_file.display().to_string(),
        "sites": sites,
        "states": states,
    });
    if print_structured(&info, &output)? {
        return Ok(());
    }

    println!("Sword System Information");
    println!("========================");
    println!();
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("Build date:  {}", env!("BUILD_DATE"));
    println!("Git commit:  {} ({})", env!("GIT_HASH"), env!("GIT_BRANCH"));
    println!();
    println!("Config file: {}", ctx.config_path().display());
    println!("State file:  {}", config.state_file.display());
    println!(
        "Browser:     {}{}",
        config.browser.executable.display(),
        if config.browser.headless { " (headless)" } else { "" }
    );
    println!("Sites:       {}", sites.join(", "));
    println!("States:      {}", states.join(" "));
    Ok(())
}
