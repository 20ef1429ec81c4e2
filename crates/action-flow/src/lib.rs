//! Booking flow orchestration
//!
//! The state machine that drives a ticket page from the opening bell to the
//! payment screen:
//! - [`Fsm`]: current state, transition validation, history, run context
//! - [`StateHandler`]: the per-state contract, with eleven implementations
//!   in [`handlers`]
//! - [`RecoveryEngine`]: bounded, per-kind recovery of handler failures

pub mod context;
pub mod engine;
pub mod errors;
pub mod handler;
pub mod handlers;
pub mod history;
pub mod recovery;

pub use context::RunContext;
pub use engine::{diagnostics_overlay, Fsm, FsmView, StateReport, DIAGNOSTICS_OVERLAY_ID};
pub use errors::FlowError;
pub use handler::{FlowServices, HandlerCx, Next, StateHandler, Subscription};
pub use history::{History, TransitionRecord};
pub use recovery::{RecoveryEngine, RecoveryOutcome, RecoveryStrategy};
