//! Raw page access implemented by each browser backend.

use async_trait::async_trait;
use sword_core_types::ElementHandle;

use crate::errors::ActionError;
use crate::types::{ElementSnapshot, Overlay, ReadyState};

/// Low-level operations over one live page.
///
/// Implementations stay dumb: no waiting, no retries, no interactability
/// policy. [`crate::Environment`] layers those on top.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Elements matching one CSS selector, in document order, optionally
    /// restricted to descendants of `scope`.
    async fn query(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> Result<Vec<ElementHandle>, ActionError>;

    /// `None` once the element has left the document.
    async fn inspect(&self, handle: &ElementHandle) -> Result<Option<ElementSnapshot>, ActionError>;

    /// Innermost elements whose text content contains `text`, in document order.
    async fn find_by_text(&self, text: &str) -> Result<Vec<ElementHandle>, ActionError>;

    /// Nearest inclusive ancestor matching `selector`.
    async fn closest(
        &self,
        handle: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, ActionError>;

    async fn click(&self, handle: &ElementHandle) -> Result<(), ActionError>;

    async fn scroll_into_view(&self, handle: &ElementHandle) -> Result<(), ActionError>;

    async fn remove(&self, handle: &ElementHandle) -> Result<(), ActionError>;

    async fn focus(&self, handle: &ElementHandle) -> Result<(), ActionError>;

    async fn highlight(&self, handle: &ElementHandle) -> Result<(), ActionError>;

    async fn current_url(&self) -> Result<String, ActionError>;

    async fn reload(&self) -> Result<(), ActionError>;

    async fn ready_state(&self) -> Result<ReadyState, ActionError>;

    /// Scroll the window to `fraction` of the document height.
    async fn scroll_page(&self, fraction: f64) -> Result<(), ActionError>;

    async fn viewport_width(&self) -> Result<f64, ActionError>;

    /// Render or replace the overlay with the same id.
    async fn show_overlay(&self, overlay: &Overlay) -> Result<(), ActionError>;

    async fn clear_overlay(&self, id: &str) -> Result<(), ActionError>;
}
