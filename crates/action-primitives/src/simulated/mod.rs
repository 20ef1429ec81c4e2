//! In-memory page for tests and the offline demo.
//!
//! [`SimulatedPage`] implements [`PageDriver`] over a [`SimDom`]: an element
//! arena with a small CSS matcher and click behaviours attached per element.
//! Every call records what happened (clicks, reloads, overlays, focus) so
//! tests can assert on the interaction trail.

mod dom;
pub mod effects;
mod mock;
mod selector;

pub use dom::{ClickEffect, ReloadEffect, SimDom, SimElement};
pub use mock::{MockTicketPage, MOCK_COMPLETE_URL, MOCK_PAYMENT_URL, MOCK_URL};
pub use selector::SelectorList;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sword_core_types::ElementHandle;

use crate::driver::PageDriver;
use crate::errors::ActionError;
use crate::types::{ElementSnapshot, Overlay, ReadyState};

#[derive(Clone)]
pub struct SimulatedPage {
    dom: Arc<Mutex<SimDom>>,
}

impl SimulatedPage {
    pub fn new(url: &str) -> Self {
        Self::from_dom(SimDom::new(url))
    }

    pub fn from_dom(dom: SimDom) -> Self {
        Self {
            dom: Arc::new(Mutex::new(dom)),
        }
    }

    /// Read or mutate the document directly, as the site or the user would.
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut SimDom) -> R) -> R {
        let mut dom = self.dom.lock();
        f(&mut *dom)
    }

    pub fn append(&self, element: SimElement) -> ElementHandle {
        self.with_dom(|dom| dom.append(element))
    }

    pub fn on_reload(&self, effect: ReloadEffect) {
        self.with_dom(|dom| dom.on_reload = Some(effect));
    }

    /// Make the next query for exactly `selector` fail with `error`, the way
    /// a page swapped out mid-run answers.
    pub fn fail_next_query(&self, selector: &str, error: ActionError) {
        self.with_dom(|dom| dom.query_faults.push((selector.to_string(), error)));
    }

    /// Click the first element matching `selector` on the user's behalf.
    /// Returns `false` when nothing matches.
    pub fn user_click(&self, selector: &str) -> bool {
        let mut dom = self.dom.lock();
        let Some(handle) = dom.first(selector) else {
            return false;
        };
        run_click(&mut *dom, &handle);
        true
    }

    pub fn first(&self, selector: &str) -> Option<ElementHandle> {
        self.with_dom(|dom| dom.first(selector))
    }

    pub fn click_count(&self, selector: &str) -> usize {
        self.with_dom(|dom| {
            dom.select(selector)
                .iter()
                .map(|handle| dom.click_count(handle))
                .sum()
        })
    }

    pub fn has_class(&self, selector: &str, class: &str) -> bool {
        self.with_dom(|dom| {
            dom.first(selector)
                .map(|handle| dom.has_class(&handle, class))
                .unwrap_or(false)
        })
    }

    pub fn url(&self) -> String {
        self.with_dom(|dom| dom.url.clone())
    }

    pub fn reloads(&self) -> u32 {
        self.with_dom(|dom| dom.reloads())
    }

    pub fn overlay(&self, id: &str) -> Option<Overlay> {
        self.with_dom(|dom| dom.overlay(id).cloned())
    }

    pub fn overlay_ids(&self) -> Vec<String> {
        self.with_dom(|dom| dom.overlays().map(|overlay| overlay.id.clone()).collect())
    }
}

fn run_click(dom: &mut SimDom, handle: &ElementHandle) {
    dom.record_click(handle);
    let effect = dom.element(handle).and_then(|element| element.on_click.clone());
    if let Some(effect) = effect {
        effect(dom, handle);
    }
}

fn detached(handle: &ElementHandle) -> ActionError {
    ActionError::Detached(handle.to_string())
}

#[async_trait]
impl PageDriver for SimulatedPage {
    async fn query(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> Result<Vec<ElementHandle>, ActionError> {
        self.with_dom(|dom| {
            if let Some(at) = dom.query_faults.iter().position(|(armed, _)| armed == selector) {
                return Err(dom.query_faults.remove(at).1);
            }
            dom.query(selector, scope)
                .map_err(|err| ActionError::Internal(format!("invalid selector '{selector}': {err}")))
        })
    }

    async fn inspect(&self, handle: &ElementHandle) -> Result<Option<ElementSnapshot>, ActionError> {
        Ok(self.with_dom(|dom| dom.snapshot(handle)))
    }

    async fn find_by_text(&self, text: &str) -> Result<Vec<ElementHandle>, ActionError> {
        Ok(self.with_dom(|dom| dom.find_text(text)))
    }

    async fn closest(
        &self,
        handle: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, ActionError> {
        SelectorList::parse(selector)
            .map_err(|err| ActionError::Internal(format!("invalid selector '{selector}': {err}")))?;
        Ok(self.with_dom(|dom| dom.closest(handle, selector)))
    }

    async fn click(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        let mut dom = self.dom.lock();
        if !dom.is_attached(handle) {
            return Err(detached(handle));
        }
        run_click(&mut *dom, handle);
        Ok(())
    }

    async fn scroll_into_view(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        if self.with_dom(|dom| dom.is_attached(handle)) {
            Ok(())
        } else {
            Err(detached(handle))
        }
    }

    async fn remove(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.with_dom(|dom| dom.remove(handle));
        Ok(())
    }

    async fn focus(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.with_dom(|dom| {
            if !dom.is_attached(handle) {
                return Err(detached(handle));
            }
            dom.set_focus(handle);
            Ok(())
        })
    }

    async fn highlight(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.with_dom(|dom| dom.add_highlight(handle));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        Ok(self.url())
    }

    async fn reload(&self) -> Result<(), ActionError> {
        let mut dom = self.dom.lock();
        dom.record_reload();
        dom.ready_state = ReadyState::Complete;
        if let Some(effect) = dom.on_reload.clone() {
            effect(&mut *dom);
        }
        Ok(())
    }

    async fn ready_state(&self) -> Result<ReadyState, ActionError> {
        Ok(self.with_dom(|dom| dom.ready_state))
    }

    async fn scroll_page(&self, fraction: f64) -> Result<(), ActionError> {
        self.with_dom(|dom| dom.scroll_fraction = fraction);
        Ok(())
    }

    async fn viewport_width(&self) -> Result<f64, ActionError> {
        Ok(self.with_dom(|dom| dom.viewport_width))
    }

    async fn show_overlay(&self, overlay: &Overlay) -> Result<(), ActionError> {
        self.with_dom(|dom| dom.put_overlay(overlay.clone()));
        Ok(())
    }

    async fn clear_overlay(&self, id: &str) -> Result<(), ActionError> {
        self.with_dom(|dom| dom.drop_overlay(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> SimulatedPage {
        let page = SimulatedPage::new("http://localhost/mock-ticket-page");
        page.append(
            SimElement::new("div")
                .class("popup notice")
                .rect(100.0, 100.0, 400.0, 300.0)
                .child(SimElement::new("p").text("공지사항"))
                .child(
                    SimElement::new("button")
                        .text("닫기")
                        .on_click(effects::remove_closest(".popup")),
                ),
        );
        page.append(
            SimElement::new("div").class("seat-row").attr("data-row", "A").children([
                SimElement::new("div").class("seat").attr("data-seat-id", "A-1"),
                SimElement::new("div").class("seat sold").attr("data-seat-id", "A-2"),
            ]),
        );
        page
    }

    #[tokio::test]
    async fn matches_compound_and_descendant_selectors() {
        let page = page();
        let available = page.query(".seat:not(.sold)", None).await.unwrap();
        assert_eq!(available.len(), 1);
        let in_row = page.query("[data-row=\"A\"] .seat", None).await.unwrap();
        assert_eq!(in_row.len(), 2);
        let close = page.query("button:contains(\"닫기\")", None).await.unwrap();
        assert_eq!(close.len(), 1);
        assert!(page.query("a[href*=\"Book\"]", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scoped_query_only_sees_descendants() {
        let page = page();
        let popup = page.first(".popup").unwrap();
        let scoped = page.query("button", Some(&popup)).await.unwrap();
        assert_eq!(scoped.len(), 1);
        let none = page.query(".seat", Some(&popup)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn click_runs_effect_and_detaches_subtree() {
        let page = page();
        let button = page.first(".popup button").unwrap();
        page.click(&button).await.unwrap();

        assert!(page.first(".popup").is_none());
        assert!(page.inspect(&button).await.unwrap().is_none());
        assert!(matches!(
            page.click(&button).await,
            Err(ActionError::Detached(_))
        ));
        assert_eq!(page.with_dom(|dom| dom.click_count(&button)), 1);
    }

    #[tokio::test]
    async fn text_search_returns_innermost_matches() {
        let page = page();
        let found = page.find_by_text("공지").await.unwrap();
        assert_eq!(found.len(), 1);
        let snapshot = page.inspect(&found[0]).await.unwrap().unwrap();
        assert_eq!(snapshot.tag, "P");
    }

    #[tokio::test]
    async fn hidden_ancestor_collapses_rect() {
        let page = page();
        page.with_dom(|dom| dom.hide(".seat-row"));
        let seat = page.first(".seat").unwrap();
        let snapshot = page.inspect(&seat).await.unwrap().unwrap();
        assert!(!snapshot.hidden);
        assert!(!snapshot.is_interactable());
    }

    #[tokio::test]
    async fn invalid_selector_is_internal_error() {
        let page = page();
        assert!(matches!(
            page.query("[data-x", None).await,
            Err(ActionError::Internal(_))
        ));
    }
}
