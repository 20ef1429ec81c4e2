//! The environment adapter the state handlers work against.
//!
//! Wraps a [`PageDriver`] with the interaction policy of the booking flow:
//! what counts as interactable, how long to wait and how often to look,
//! and when a click is safe. Every wait observes the run's cancellation
//! token and returns [`ActionError::Interrupted`] once it fires.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sword_core_types::ElementHandle;
use sword_site_config::SelectorSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::driver::PageDriver;
use crate::errors::ActionError;
use crate::types::{ElementSnapshot, Overlay, ReadyState};
use crate::waiting::PollSchedule;

/// Element kinds searched first when looking for a clickable label.
pub const CLICKABLE_SELECTORS: [&str; 6] = [
    "button",
    "a",
    "[onclick]",
    "[role=\"button\"]",
    ".btn",
    ".button",
];

const SCROLL_SETTLE: Duration = Duration::from_millis(300);
const READY_POLL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct Environment {
    driver: Arc<dyn PageDriver>,
    cancel: CancellationToken,
    schedule: PollSchedule,
}

impl Environment {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            driver,
            cancel: CancellationToken::new(),
            schedule: PollSchedule::default(),
        }
    }

    /// Same page, different cancellation scope.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            cancel,
            schedule: self.schedule.clone(),
        }
    }

    pub fn with_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn ensure_live(&self) -> Result<(), ActionError> {
        if self.cancel.is_cancelled() {
            return Err(ActionError::Interrupted("run cancelled".to_string()));
        }
        Ok(())
    }

    /// Cancellable delay.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ActionError> {
        self.ensure_live()?;
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ActionError::Interrupted("run cancelled".to_string())),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn query_selector(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> Result<Vec<ElementHandle>, ActionError> {
        match self.driver.query(selector, scope).await {
            Ok(handles) => Ok(handles),
            Err(ActionError::Internal(message)) => {
                warn!(selector, %message, "skipping unusable selector");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// First element present for any selector, in selector order.
    pub async fn find_first(&self, set: &SelectorSet) -> Result<Option<ElementHandle>, ActionError> {
        self.ensure_live()?;
        for selector in set.iter() {
            if let Some(handle) = self.query_selector(selector, None).await?.into_iter().next() {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// De-duplicated union over the selector set, in selector order.
    pub async fn find_all(&self, set: &SelectorSet) -> Result<Vec<ElementHandle>, ActionError> {
        self.ensure_live()?;
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for selector in set.iter() {
            for handle in self.query_selector(selector, None).await? {
                if seen.insert(handle.clone()) {
                    found.push(handle);
                }
            }
        }
        Ok(found)
    }

    pub async fn find_first_interactable(
        &self,
        set: &SelectorSet,
    ) -> Result<Option<ElementHandle>, ActionError> {
        self.find_first_interactable_in(set, None).await
    }

    pub async fn find_first_interactable_in(
        &self,
        set: &SelectorSet,
        scope: Option<&ElementHandle>,
    ) -> Result<Option<ElementHandle>, ActionError> {
        self.ensure_live()?;
        for selector in set.iter() {
            for handle in self.query_selector(selector, scope).await? {
                if self.is_interactable(&handle).await? {
                    return Ok(Some(handle));
                }
            }
        }
        Ok(None)
    }

    pub async fn find_all_interactable(
        &self,
        set: &SelectorSet,
    ) -> Result<Vec<ElementHandle>, ActionError> {
        let mut ready = Vec::new();
        for handle in self.find_all(set).await? {
            if self.is_interactable(&handle).await? {
                ready.push(handle);
            }
        }
        Ok(ready)
    }

    pub async fn inspect(&self, handle: &ElementHandle) -> Result<Option<ElementSnapshot>, ActionError> {
        self.driver.inspect(handle).await
    }

    pub async fn is_interactable(&self, handle: &ElementHandle) -> Result<bool, ActionError> {
        Ok(self
            .driver
            .inspect(handle)
            .await?
            .map(|snapshot| snapshot.is_interactable())
            .unwrap_or(false))
    }

    /// Wait until any selector yields an interactable element.
    pub async fn wait_for_appearance(
        &self,
        set: &SelectorSet,
        timeout: Duration,
    ) -> Result<ElementHandle, ActionError> {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0;
        loop {
            if let Some(handle) = self.find_first_interactable(set).await? {
                return Ok(handle);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ActionError::WaitTimeout(format!(
                    "{} not visible after {}ms",
                    set.joined(),
                    timeout.as_millis()
                )));
            }
            self.sleep(self.schedule.gap(attempt, remaining)).await?;
            attempt += 1;
        }
    }

    /// `true` once no selector yields an interactable element, `false` on timeout.
    pub async fn wait_for_disappearance(
        &self,
        set: &SelectorSet,
        timeout: Duration,
    ) -> Result<bool, ActionError> {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0;
        loop {
            if self.find_first_interactable(set).await?.is_none() {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            self.sleep(self.schedule.gap(attempt, remaining)).await?;
            attempt += 1;
        }
    }

    /// Validate, wait `delay`, then click.
    pub async fn click(&self, handle: &ElementHandle, delay: Duration) -> Result<(), ActionError> {
        self.ensure_live()?;
        let snapshot = self
            .driver
            .inspect(handle)
            .await?
            .ok_or_else(|| ActionError::Detached(handle.to_string()))?;
        if snapshot.disabled {
            return Err(ActionError::NotEnabled(describe(&snapshot)));
        }
        if snapshot.hidden || snapshot.rect.is_empty() {
            return Err(ActionError::NotClickable(describe(&snapshot)));
        }
        self.sleep(delay).await?;
        self.driver.click(handle).await?;
        debug!(
            tag = %snapshot.tag,
            id = snapshot.id.as_deref().unwrap_or(""),
            class = %snapshot.class_name(),
            "click"
        );
        Ok(())
    }

    /// Scroll the element to the viewport center and let it settle.
    pub async fn scroll_into_view(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.ensure_live()?;
        self.driver.scroll_into_view(handle).await?;
        self.sleep(SCROLL_SETTLE).await
    }

    /// Prefers an exact text match over an element merely containing the text.
    pub async fn find_by_visible_text(&self, text: &str) -> Result<Option<ElementHandle>, ActionError> {
        self.ensure_live()?;
        let mut fallback = None;
        for handle in self.driver.find_by_text(text).await? {
            let Some(snapshot) = self.driver.inspect(&handle).await? else {
                continue;
            };
            if !snapshot.is_interactable() {
                continue;
            }
            if snapshot.text == text {
                return Ok(Some(handle));
            }
            if fallback.is_none() {
                fallback = Some(handle);
            }
        }
        Ok(fallback)
    }

    pub async fn page_has_text(&self, text: &str) -> Result<bool, ActionError> {
        Ok(self.find_by_visible_text(text).await?.is_some())
    }

    pub async fn page_has_any_text(&self, texts: &[String]) -> Result<bool, ActionError> {
        for text in texts {
            if self.page_has_text(text).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Buttons, links and button-like elements first, then any element.
    pub async fn find_clickable_by_text(&self, text: &str) -> Result<Option<ElementHandle>, ActionError> {
        self.ensure_live()?;
        for selector in CLICKABLE_SELECTORS {
            for handle in self.query_selector(selector, None).await? {
                let Some(snapshot) = self.driver.inspect(&handle).await? else {
                    continue;
                };
                if snapshot.text.contains(text) && snapshot.is_interactable() {
                    return Ok(Some(handle));
                }
            }
        }
        self.find_by_visible_text(text).await
    }

    /// First label in `texts` with a clickable match, with the label that hit.
    pub async fn find_clickable_by_any_text<'a>(
        &self,
        texts: &'a [String],
    ) -> Result<Option<(ElementHandle, &'a str)>, ActionError> {
        for text in texts {
            if let Some(handle) = self.find_clickable_by_text(text).await? {
                return Ok(Some((handle, text.as_str())));
            }
        }
        Ok(None)
    }

    pub async fn fingerprint(&self, handle: &ElementHandle) -> Result<Option<String>, ActionError> {
        Ok(self
            .driver
            .inspect(handle)
            .await?
            .map(|snapshot| snapshot.fingerprint()))
    }

    pub async fn closest(
        &self,
        handle: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, ActionError> {
        self.driver.closest(handle, selector).await
    }

    pub async fn remove(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.driver.remove(handle).await
    }

    pub async fn remove_all(&self, set: &SelectorSet) -> Result<usize, ActionError> {
        let handles = self.find_all(set).await?;
        for handle in &handles {
            self.driver.remove(handle).await?;
        }
        Ok(handles.len())
    }

    /// Focus an input and draw attention to it.
    pub async fn focus_and_highlight(&self, handle: &ElementHandle) -> Result<(), ActionError> {
        self.driver.focus(handle).await?;
        self.driver.highlight(handle).await
    }

    pub async fn current_url(&self) -> Result<String, ActionError> {
        self.driver.current_url().await
    }

    pub async fn url_contains(&self, needle: &str) -> Result<bool, ActionError> {
        Ok(self.current_url().await?.contains(needle))
    }

    pub async fn url_contains_any(&self, needles: &[String]) -> Result<bool, ActionError> {
        let url = self.current_url().await?;
        Ok(needles.iter().any(|needle| url.contains(needle.as_str())))
    }

    pub async fn reload(&self) -> Result<(), ActionError> {
        self.ensure_live()?;
        self.driver.reload().await
    }

    pub async fn wait_for_page_load(&self, timeout: Duration) -> Result<(), ActionError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.driver.ready_state().await? == ReadyState::Complete {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ActionError::WaitTimeout("page load".to_string()));
            }
            self.sleep(READY_POLL.min(remaining)).await?;
        }
    }

    pub async fn scroll_page(&self, fraction: f64) -> Result<(), ActionError> {
        self.driver.scroll_page(fraction.clamp(0.0, 1.0)).await
    }

    pub async fn viewport_width(&self) -> Result<f64, ActionError> {
        self.driver.viewport_width().await
    }

    pub async fn show_overlay(&self, overlay: &Overlay) -> Result<(), ActionError> {
        self.driver.show_overlay(overlay).await
    }

    pub async fn clear_overlay(&self, id: &str) -> Result<(), ActionError> {
        self.driver.clear_overlay(id).await
    }
}

fn describe(snapshot: &ElementSnapshot) -> String {
    match &snapshot.id {
        Some(id) => format!("{}#{}", snapshot.tag, id),
        None if !snapshot.classes.is_empty() => format!("{}.{}", snapshot.tag, snapshot.classes.join(".")),
        None => snapshot.tag.clone(),
    }
}
