//! Environment adapter for the sword booking automation
//!
//! This crate is the only place the purchase flow touches a page:
//! - [`PageDriver`]: raw element lookup, inspection and input over one page
//! - [`Environment`]: interactability checks, progressive waits, safe clicks
//!   and text search built on a driver, all cancellable per run
//! - [`simulated`]: an in-memory page used by tests and the offline demo

mod driver;
mod environment;
pub mod errors;
pub mod simulated;
pub mod types;
mod waiting;

pub use driver::PageDriver;
pub use environment::{Environment, CLICKABLE_SELECTORS};
pub use errors::ActionError;
pub use types::*;
pub use waiting::PollSchedule;
