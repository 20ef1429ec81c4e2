use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use sword_action_flow::FlowServices;
use sword_action_primitives::simulated::{MockTicketPage, SimulatedPage};
use sword_action_primitives::Environment;
use sword_cli::AutomationSession;
use sword_core_types::RunConfig;
use sword_site_config::defaults::MOCKTEST;
use tracing::info;

use super::context::CliContext;
use super::output::OutputFormat;
use super::stream::{finish, follow};

const MOCK_ROWS: [&str; 3] = ["A", "B", "C"];

#[derive(Args, Clone, Debug)]
pub struct DemoArgs {
    /// Number of seats to book
    #[arg(long, default_value_t = 1)]
    pub seats: u32,

    /// Notice popups shown after pressing the reserve button
    #[arg(long, default_value_t = 1)]
    pub popups: usize,

    /// Rows (from the front) whose center seat a competitor grabs first
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub taken: u8,

    /// Put a CAPTCHA in front of the reserve button
    #[arg(long)]
    pub captcha: bool,

    /// How long the simulated user takes to solve the CAPTCHA
    #[arg(long, default_value_t = 1_500)]
    pub solve_after_ms: u64,

    /// Draw the state/retries/time panel on the page
    #[arg(long)]
    pub diagnostics: bool,
}

pub async fn cmd_demo(args: DemoArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let site = ctx
        .sites()
        .require(MOCKTEST)
        .context("The mock site table is missing")?
        .clone();

    let mock = MockTicketPage::new().popups(args.popups).captcha(args.captcha);
    let taken: Vec<String> = MOCK_ROWS
        .iter()
        .take(usize::from(args.taken))
        .map(|row| mock.center_seat(row))
        .collect();
    let taken_refs: Vec<&str> = taken.iter().map(String::as_str).collect();
    let page = mock.taken(&taken_refs).build();

    info!(
        popups = args.popups,
        taken = ?taken,
        captcha = args.captcha,
        "mock ticket page ready"
    );
    let session = AutomationSession::new(
        Environment::new(Arc::new(page.clone())),
        Arc::new(site),
        FlowServices::in_memory(),
    )?;
    let events = session.subscribe();
    let handle = session.spawn();

    if args.diagnostics {
        handle.toggle_diagnostics_overlay().await?;
    }
    if args.captcha {
        spawn_user_solving_captcha(page, Duration::from_millis(args.solve_after_ms));
    }
    handle.start(RunConfig::with_seats(args.seats)).await?;

    let state = follow(&handle, events, &output).await?;
    let report = handle.get_state().await?;
    finish(state, &report, &output)
}

fn spawn_user_solving_captcha(page: SimulatedPage, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if page.user_click("#btnCaptcha") {
            info!("simulated user solved the CAPTCHA");
        }
    });
}
