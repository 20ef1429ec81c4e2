use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of purchase-flow states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateId {
    Idle,
    WaitOpen,
    ClickStart,
    HandlePopup,
    SelectZone,
    SelectSeat,
    Confirm,
    HandleCaptcha,
    Payment,
    Error,
    Failed,
}

impl StateId {
    pub const ALL: [StateId; 11] = [
        StateId::Idle,
        StateId::WaitOpen,
        StateId::ClickStart,
        StateId::HandlePopup,
        StateId::SelectZone,
        StateId::SelectSeat,
        StateId::Confirm,
        StateId::HandleCaptcha,
        StateId::Payment,
        StateId::Error,
        StateId::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateId::Idle => "IDLE",
            StateId::WaitOpen => "WAIT_OPEN",
            StateId::ClickStart => "CLICK_START",
            StateId::HandlePopup => "HANDLE_POPUP",
            StateId::SelectZone => "SELECT_ZONE",
            StateId::SelectSeat => "SELECT_SEAT",
            StateId::Confirm => "CONFIRM",
            StateId::HandleCaptcha => "HANDLE_CAPTCHA",
            StateId::Payment => "PAYMENT",
            StateId::Error => "ERROR",
            StateId::Failed => "FAILED",
        }
    }

    /// PAYMENT and FAILED end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StateId::Payment | StateId::Failed)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StateId::Payment)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace('-', "_");
        StateId::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| format!("unknown state '{value}'"))
    }
}
