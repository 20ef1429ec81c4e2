use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use sword_event_bus::SupervisorEvent;

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Print a machine-readable value: one JSON line, or one YAML document.
/// Returns `false` for [`OutputFormat::Human`], leaving the caller to render it.
pub fn print_structured<T: Serialize>(value: &T, format: &OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Human => Ok(false),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(value)?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("---\n{}", serde_yaml::to_string(value)?);
            Ok(true)
        }
    }
}

pub fn print_event(event: &SupervisorEvent, format: &OutputFormat) -> Result<()> {
    if print_structured(event, format)? {
        return Ok(());
    }
    println!("{}", describe_event(event));
    Ok(())
}

pub fn describe_event(event: &SupervisorEvent) -> String {
    match event {
        SupervisorEvent::StateChanged {
            from, to, reason, ..
        } => format!("[state] {from} -> {to} ({reason})"),
        SupervisorEvent::AutomationSucceeded {
            elapsed_ms,
            seat_count,
            seats,
        } => {
            let seats = seats
                .iter()
                .map(|seat| seat.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "[success] {seat_count} seat(s) in {:.1}s: {seats}",
                *elapsed_ms as f64 / 1_000.0
            )
        }
        SupervisorEvent::AutomationFailed {
            reason, last_error, ..
        } => match last_error {
            Some(error) => format!("[failed] {reason} (last error: {} {})", error.kind, error.message),
            None => format!("[failed] {reason}"),
        },
        SupervisorEvent::Progress { formatted, .. } => format!("[waiting] {formatted} until opening"),
        SupervisorEvent::ManualActionRequired { action, message } => {
            format!("[action required] {action}: {message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sword_core_types::StateId;

    #[test]
    fn state_change_reads_as_an_arrow() {
        let event = SupervisorEvent::StateChanged {
            from: StateId::Idle,
            to: StateId::ClickStart,
            reason: "start".into(),
            context: Default::default(),
        };
        assert_eq!(describe_event(&event), "[state] IDLE -> CLICK_START (start)");
    }

    #[test]
    fn human_format_is_not_structured() {
        let event = SupervisorEvent::Progress {
            remaining_ms: 1_000,
            formatted: "0:00:01".into(),
        };
        assert!(!print_structured(&event, &OutputFormat::Human).unwrap());
    }
}
