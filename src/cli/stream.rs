use anyhow::{bail, Result};
use serde_json::json;
use sword_action_flow::StateReport;
use sword_cli::SupervisorHandle;
use sword_core_types::StateId;
use sword_event_bus::SupervisorEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use super::output::{print_event, print_structured, OutputFormat};

/// Print supervisor events until the run parks. Ctrl+C stops the run.
pub async fn follow(
    handle: &SupervisorHandle,
    mut events: broadcast::Receiver<SupervisorEvent>,
    format: &OutputFormat,
) -> Result<StateId> {
    let parked = handle.wait_until_parked();
    tokio::pin!(parked);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let state = loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => print_event(&event, format)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break (&mut parked).await?,
            },
            state = &mut parked => break state?,
            _ = &mut interrupt => {
                info!("Interrupted, stopping automation");
                break handle.stop().await?;
            }
        }
    };

    // Events published just before the run parked.
    while let Ok(event) = events.try_recv() {
        print_event(&event, format)?;
    }
    Ok(state)
}

/// Print the final report; a run that ended in FAILED is an error.
pub fn finish(state: StateId, report: &StateReport, format: &OutputFormat) -> Result<()> {
    let summary = json!({ "type": "finished", "state": state, "report": report });
    if !print_structured(&summary, format)? {
        println!();
        println!("Finished in {state}");
        let context = &report.context;
        if !context.selected_seats.is_empty() {
            let seats = context
                .selected_seats
                .iter()
                .map(|seat| seat.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            println!("  Seats:   {seats}");
        }
        if let Some(elapsed) = context.elapsed_ms {
            println!("  Time:    {:.1}s", elapsed as f64 / 1_000.0);
        }
        println!("  Retries: {}", context.retry_count);
        println!("  Errors:  {}", context.error_count);
        if let Some(error) = &context.last_error {
            println!("  Last:    {} {}", error.kind, error.message);
        }
    }

    if state == StateId::Failed {
        bail!("automation failed");
    }
    Ok(())
}
