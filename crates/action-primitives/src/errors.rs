//! Error types for page interactions

use sword_core_types::{AutomationError, ErrorKind};
use thiserror::Error;

/// Failures raised by the page driver or the environment built on top of it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    /// Wait operation timed out
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// The run was cancelled while waiting
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// Element is hidden or has no box to click
    #[error("Element not clickable: {0}")]
    NotClickable(String),

    /// Element is disabled
    #[error("Element not enabled: {0}")]
    NotEnabled(String),

    /// Handle no longer points into the live document
    #[error("Element detached: {0}")]
    Detached(String),

    /// The page navigated or reloaded under the operation
    #[error("Stale route: {0}")]
    StaleRoute(String),

    /// DevTools communication or protocol error
    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::WaitTimeout(_)
                | ActionError::NotClickable(_)
                | ActionError::NotEnabled(_)
                | ActionError::Detached(_)
                | ActionError::CdpIo(_)
        )
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ActionError::Interrupted(_))
    }

    /// Failure class the recovery engine dispatches on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::WaitTimeout(_) | ActionError::Detached(_) => ErrorKind::ElementNotFound,
            ActionError::NotClickable(_) | ActionError::NotEnabled(_) => ErrorKind::ButtonDisabled,
            ActionError::CdpIo(_) => ErrorKind::NetworkTimeout,
            ActionError::StaleRoute(_) => ErrorKind::PageReload,
            ActionError::Interrupted(_) | ActionError::Internal(_) => ErrorKind::Unknown,
        }
    }
}

impl From<ActionError> for AutomationError {
    fn from(err: ActionError) -> Self {
        let recoverable = !matches!(err, ActionError::Internal(_));
        AutomationError::new(err.kind(), err.to_string(), recoverable)
    }
}
