//! Engine configuration errors

use sword_core_types::{ConfigError, StateId};
use thiserror::Error;

/// Faults in how the engine is wired or driven. Handler failures are
/// [`sword_core_types::AutomationError`]s and never surface here.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Two handlers claimed the same state
    #[error("State {0} is already registered")]
    DuplicateState(StateId),

    /// Transition target has no handler
    #[error("No handler registered for state {0}")]
    UnknownState(StateId),

    /// Start requested while a run is in progress
    #[error("Automation is busy in state {0}")]
    Busy(StateId),

    /// Start configuration rejected
    #[error("Invalid run configuration: {0}")]
    Config(#[from] ConfigError),
}
