use std::fmt;

use serde::{Deserialize, Serialize};
use sword_action_primitives::ActionError;
use thiserror::Error;

/// High-level error categories surfaced by the adapter.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterErrorKind {
    #[error("command timed out")]
    Timeout,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("browser launch failed")]
    Launch,
    #[error("internal error")]
    Internal,
}

/// Error with the context a caller needs to decide whether to retry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: false,
            data: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        match err.kind {
            AdapterErrorKind::Internal => ActionError::Internal(err.to_string()),
            AdapterErrorKind::Timeout | AdapterErrorKind::CdpIo | AdapterErrorKind::Launch => {
                ActionError::CdpIo(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_failures_become_io_errors() {
        let err: ActionError = AdapterError::new(AdapterErrorKind::Timeout)
            .with_hint("Runtime.evaluate")
            .into();
        assert_eq!(err, ActionError::CdpIo("command timed out: Runtime.evaluate".into()));

        let err: ActionError = AdapterError::new(AdapterErrorKind::Internal).into();
        assert!(matches!(err, ActionError::Internal(_)));
    }
}
