use serde::{Deserialize, Serialize};
use sword_core_types::{ContextSnapshot, RecordedError, SeatRef, StateId};

/// Notifications a supervisor receives while a run progresses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SupervisorEvent {
    #[serde(rename_all = "camelCase")]
    StateChanged {
        from: StateId,
        to: StateId,
        reason: String,
        context: ContextSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    AutomationSucceeded {
        elapsed_ms: i64,
        seat_count: usize,
        seats: Vec<SeatRef>,
    },
    #[serde(rename_all = "camelCase")]
    AutomationFailed {
        reason: String,
        last_error: Option<RecordedError>,
        /// ERROR-level entries of the run log, oldest first.
        error_log: Vec<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    Progress { remaining_ms: i64, formatted: String },
    #[serde(rename_all = "camelCase")]
    ManualActionRequired { action: String, message: String },
}

impl SupervisorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SupervisorEvent::StateChanged { .. } => "state-changed",
            SupervisorEvent::AutomationSucceeded { .. } => "automation-succeeded",
            SupervisorEvent::AutomationFailed { .. } => "automation-failed",
            SupervisorEvent::Progress { .. } => "progress",
            SupervisorEvent::ManualActionRequired { .. } => "manual-action-required",
        }
    }

    /// True for the events that close a run.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SupervisorEvent::AutomationSucceeded { .. } | SupervisorEvent::AutomationFailed { .. }
        )
    }
}
