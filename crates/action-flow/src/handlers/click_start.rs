use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sword_action_primitives::ActionError;
use sword_core_types::{AutomationError, ElementHandle, ErrorKind, StateId};

use crate::handler::{HandlerCx, Next, StateHandler};

const SETTLE_AFTER_CLICK: Duration = Duration::from_millis(500);

/// Finds and clicks the reservation entry point.
#[derive(Debug, Default)]
pub struct ClickStartHandler;

impl ClickStartHandler {
    /// The page may already be past the reserve button.
    async fn early_branch(&self, cx: &HandlerCx<'_>) -> Result<Option<Next>, ActionError> {
        let selectors = &cx.site.selectors;
        if cx.env.find_first_interactable(&selectors.zones).await?.is_some() {
            return Ok(Some(Next::to(StateId::SelectZone, "zones already visible")));
        }
        if cx.env.find_first_interactable(&selectors.seats).await?.is_some() {
            return Ok(Some(Next::to(StateId::SelectSeat, "seat map already visible")));
        }
        let url = cx.env.current_url().await?;
        if cx.site.is_payment_step_url(&url)
            || cx.env.page_has_any_text(&cx.site.markers.payment_step_texts).await?
        {
            return Ok(Some(Next::to(StateId::Payment, "already on a payment step")));
        }
        Ok(None)
    }

    async fn find_reserve(&self, cx: &HandlerCx<'_>) -> Result<Option<ElementHandle>, ActionError> {
        if let Some(button) = cx
            .env
            .find_first_interactable(&cx.site.selectors.reserve_button)
            .await?
        {
            return Ok(Some(button));
        }
        let found = cx.env.find_clickable_by_any_text(&cx.site.texts.reserve).await?;
        if let Some((_, label)) = &found {
            cx.debug("RESERVE_FOUND_BY_TEXT", json!({ "text": label }));
        }
        Ok(found.map(|(button, _)| button))
    }

    async fn captcha_present(&self, cx: &HandlerCx<'_>) -> Result<bool, ActionError> {
        let captcha = &cx.site.captcha;
        if cx.env.find_first_interactable(&captcha.selectors).await?.is_some() {
            return Ok(true);
        }
        cx.env.page_has_any_text(&captcha.texts).await
    }
}

#[async_trait]
impl StateHandler for ClickStartHandler {
    fn id(&self) -> StateId {
        StateId::ClickStart
    }

    fn allowed(&self) -> &'static [StateId] {
        &[
            StateId::HandlePopup,
            StateId::SelectZone,
            StateId::SelectSeat,
            StateId::HandleCaptcha,
            StateId::Payment,
        ]
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        let max = cx.site.retry.max_attempts.click_start.max(1);
        for attempt in 0..max {
            cx.info("CLICK_START_ATTEMPT", json!({ "attempt": attempt + 1, "max": max }));

            if let Some(next) = self.early_branch(cx).await? {
                cx.info("CLICK_START_SKIPPED", json!({ "to": next.to, "reason": next.reason }));
                return Ok(Some(next));
            }

            match self.find_reserve(cx).await? {
                Some(button) => {
                    cx.env.scroll_into_view(&button).await?;
                    match cx.env.click(&button, cx.site.timing.click_delay()).await {
                        Ok(()) => {
                            cx.info("RESERVE_BUTTON_CLICKED", json!({ "attempt": attempt + 1 }));
                            cx.env.sleep(SETTLE_AFTER_CLICK).await?;
                            let popup = cx.site.features.handle_popups
                                && cx
                                    .env
                                    .find_first_interactable(&cx.site.selectors.popup)
                                    .await?
                                    .is_some();
                            return Ok(Some(if popup {
                                Next::to(StateId::HandlePopup, "popup after reserve")
                            } else {
                                Next::to(StateId::SelectZone, "reserve clicked")
                            }));
                        }
                        Err(err) if err.is_interrupted() => return Err(err.into()),
                        Err(err) => {
                            cx.warn(
                                "RESERVE_CLICK_FAILED",
                                json!({ "attempt": attempt + 1, "error": err.to_string() }),
                            );
                        }
                    }
                }
                None => {
                    if self.captcha_present(cx).await? {
                        cx.warn("CAPTCHA_DETECTED", json!({ "during": StateId::ClickStart }));
                        return Ok(Some(Next::to(StateId::HandleCaptcha, "captcha before reserve")));
                    }
                    cx.debug("RESERVE_BUTTON_MISSING", json!({ "attempt": attempt + 1 }));
                }
            }

            if attempt + 1 < max {
                let delay = cx.site.retry.backoff(cx.site.timing.retry_delay(), attempt);
                cx.env.sleep(delay).await?;
            }
        }

        Err(AutomationError::recoverable(
            ErrorKind::ElementNotFound,
            format!("reserve button not clickable after {max} attempts"),
        )
        .with_selector(cx.site.selectors.reserve_button.joined()))
    }
}
