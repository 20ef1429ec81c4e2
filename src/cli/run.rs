use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use clap::Args;
use sword_action_flow::FlowServices;
use sword_action_primitives::Environment;
use sword_cdp_adapter::{CdpTransport, ChromiumPage, ChromiumTransport};
use sword_cli::AutomationSession;
use sword_core_types::RunConfig;
use sword_site_config::SiteConfig;
use sword_state_center::FileRunStateStore;
use tracing::info;

use super::context::CliContext;
use super::output::OutputFormat;
use super::stream::{finish, follow};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Booking page to open
    #[arg(long)]
    pub url: String,

    /// Site table to use (detected from the URL when omitted)
    #[arg(long)]
    pub site: Option<String>,

    /// Number of seats to book
    #[arg(long, default_value_t = 1)]
    pub seats: u32,

    /// Opening time, RFC 3339 or epoch milliseconds
    #[arg(long, value_parser = parse_target_time)]
    pub at: Option<i64>,

    /// Reload the page at opening time
    #[arg(long)]
    pub auto_refresh: bool,

    /// Run Chrome without a window
    #[arg(long)]
    pub headless: bool,

    /// Resume a run a previous invocation left active instead of starting anew
    #[arg(long)]
    pub resume: bool,

    /// Draw the state/retries/time panel on the page
    #[arg(long)]
    pub diagnostics: bool,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let site = resolve_site(&args, ctx)?;
    let mut options = ctx.config().browser.clone();
    if args.headless {
        options.headless = true;
    }

    info!(site = %site.name, url = %args.url, "opening booking page");
    let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(options));
    let page = ChromiumPage::open(transport, &args.url)
        .await
        .context("Failed to open the booking page")?;

    let store = Arc::new(FileRunStateStore::new(ctx.config().state_file.clone()));
    let services = FlowServices::with_store(store);
    let mut session =
        AutomationSession::new(Environment::new(Arc::new(page)), Arc::new(site), services)?;

    let events = session.subscribe();
    let resumed = args.resume && session.resume_if_needed().await?;
    let handle = session.spawn();
    if args.diagnostics {
        handle.toggle_diagnostics_overlay().await?;
    }
    if !resumed {
        let config = RunConfig {
            target_time: args.at,
            seat_count: args.seats,
            auto_refresh: args.auto_refresh,
        };
        handle.start(config).await?;
    }

    let state = follow(&handle, events, &output).await?;
    let report = handle.get_state().await?;
    finish(state, &report, &output)
}

fn resolve_site(args: &RunArgs, ctx: &CliContext) -> Result<SiteConfig> {
    let sites = ctx.sites();
    if let Some(name) = &args.site {
        return Ok(sites.require(name)?.clone());
    }
    if let Some(site) = sites.resolve_url(&args.url) {
        return Ok(site.clone());
    }
    match &ctx.config().default_site {
        Some(name) => Ok(sites.require(name)?.clone()),
        None => Err(anyhow!(
            "No site table matches {}; pass --site or set default_site",
            args.url
        )),
    }
}

pub fn parse_target_time(raw: &str) -> Result<i64, String> {
    if let Ok(millis) = raw.trim().parse::<i64>() {
        return Ok(millis);
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|time| time.timestamp_millis())
        .map_err(|err| format!("expected RFC 3339 or epoch milliseconds: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_time_accepts_both_forms() {
        assert_eq!(parse_target_time("1700000000000"), Ok(1_700_000_000_000));
        assert_eq!(
            parse_target_time("2023-11-14T22:13:20Z"),
            Ok(1_700_000_000_000)
        );
        assert!(parse_target_time("tomorrow").is_err());
    }
}
