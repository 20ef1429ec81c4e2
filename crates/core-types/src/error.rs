use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ElementHandle, StateId};

/// Failure taxonomy the recovery engine dispatches on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NetworkTimeout,
    ElementNotFound,
    SeatConflict,
    PopupLoop,
    PageReload,
    CaptchaFailed,
    ButtonDisabled,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkTimeout => "NETWORK_TIMEOUT",
            ErrorKind::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorKind::SeatConflict => "SEAT_CONFLICT",
            ErrorKind::PopupLoop => "POPUP_LOOP",
            ErrorKind::PageReload => "PAGE_RELOAD",
            ErrorKind::CaptchaFailed => "CAPTCHA_FAILED",
            ErrorKind::ButtonDisabled => "BUTTON_DISABLED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured context attached to a failure at the site where it happened.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup: Option<ElementHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<ElementHandle>,
    /// State the failure was raised in; filled by the engine when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateId>,
}

/// Error raised by a state handler and consumed once by the recovery engine.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct AutomationError {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
    #[serde(default)]
    pub meta: ErrorMeta,
}

impl AutomationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable,
            meta: ErrorMeta::default(),
        }
    }

    pub fn recoverable(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, true)
    }

    pub fn fatal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, false)
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.meta.selector = Some(selector.into());
        self
    }

    pub fn with_seat(mut self, seat: impl Into<String>) -> Self {
        self.meta.seat = Some(seat.into());
        self
    }

    pub fn with_popup(mut self, popup: ElementHandle) -> Self {
        self.meta.popup = Some(popup);
        self
    }

    pub fn with_button(mut self, button: ElementHandle) -> Self {
        self.meta.button = Some(button);
        self
    }

    pub fn in_state(mut self, state: StateId) -> Self {
        self.meta.state = Some(state);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_meta() {
        let err = AutomationError::recoverable(ErrorKind::SeatConflict, "seat taken")
            .with_seat("A-12")
            .in_state(StateId::SelectSeat);
        assert!(err.recoverable);
        assert_eq!(err.meta.seat.as_deref(), Some("A-12"));
        assert_eq!(err.meta.state, Some(StateId::SelectSeat));
        assert_eq!(err.to_string(), "SEAT_CONFLICT: seat taken");
    }

    #[test]
    fn meta_skips_empty_fields() {
        let err = AutomationError::fatal(ErrorKind::Unknown, "boom");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "UNKNOWN");
        assert_eq!(value["recoverable"], false);
        assert!(value["meta"].as_object().unwrap().is_empty());
    }
}
