//! Shared primitives for the sword booking automation crates.
//!
//! Everything here is plain data: state identities, the error taxonomy,
//! the run configuration handed over by the supervisor, and the
//! serializable snapshot of a run that crosses crate boundaries.

mod error;
mod run;
mod state;

pub use error::{AutomationError, ErrorKind, ErrorMeta};
pub use run::{ConfigError, ContextSnapshot, RecordedError, RunConfig, SeatRef};
pub use state::StateId;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to a node on the live page.
///
/// Handles are minted by a page driver and only mean something to the driver
/// that produced them. A handle may go stale when the page re-renders.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one automation run (start → terminal state).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
