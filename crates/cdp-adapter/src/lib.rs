//! Chromium backend for the sword environment adapter.
//!
//! [`ChromiumPage`] implements [`sword_action_primitives::PageDriver`] over
//! one DevTools session. Element handles are tokens into a registry the page
//! script keeps on `window`, so a reload or navigation invalidates them the
//! same way it invalidates the elements themselves.

pub mod config;
pub mod error;
mod page;
mod script;
pub mod transport;
pub mod util;

pub use config::BrowserOptions;
pub use error::{AdapterError, AdapterErrorKind};
pub use page::ChromiumPage;
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget};
