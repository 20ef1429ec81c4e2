//! Sword library
//!
//! Session and supervisor plumbing around the booking state machine,
//! exposed for the `sword` binary and integration tests.

pub mod config;
pub mod session;
pub mod supervisor;

pub use config::Config;
pub use session::{is_booking_page, AutomationSession};
pub use supervisor::{RunStatus, SessionError, SupervisorCommand, SupervisorHandle};
