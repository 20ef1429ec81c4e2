use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sword_action_primitives::ActionError;
use sword_core_types::{AutomationError, ElementHandle, ErrorKind, StateId};
use tokio::time::Instant;

use crate::handler::{HandlerCx, Next, StateHandler};

const PAYMENT_POLL: Duration = Duration::from_millis(200);

/// Clicks the confirm control and waits for the payment page.
#[derive(Debug, Default)]
pub struct ConfirmHandler;

enum Located {
    Ready(ElementHandle),
    Disabled(ElementHandle),
    Missing,
}

impl ConfirmHandler {
    async fn locate(&self, cx: &HandlerCx<'_>) -> Result<Located, ActionError> {
        let selectors = &cx.site.selectors.confirm_button;
        match cx
            .env
            .wait_for_appearance(selectors, cx.site.timing.element_timeout())
            .await
        {
            Ok(button) => return Ok(Located::Ready(button)),
            Err(ActionError::WaitTimeout(_)) => {}
            Err(err) => return Err(err),
        }
        if let Some((button, label)) = cx.env.find_clickable_by_any_text(&cx.site.texts.confirm).await? {
            cx.debug("CONFIRM_FOUND_BY_TEXT", json!({ "text": label }));
            return Ok(Located::Ready(button));
        }
        if let Some(button) = cx.env.find_first(selectors).await? {
            let disabled = cx
                .env
                .inspect(&button)
                .await?
                .map_or(false, |snapshot| snapshot.disabled);
            if disabled {
                return Ok(Located::Disabled(button));
            }
        }
        Ok(Located::Missing)
    }

    async fn reached_payment(&self, cx: &HandlerCx<'_>) -> Result<bool, ActionError> {
        let deadline = Instant::now() + cx.site.timing.page_load_timeout();
        loop {
            let url = cx.env.current_url().await?;
            if cx.site.is_payment_url(&url)
                || cx
                    .env
                    .find_first_interactable(&cx.site.markers.payment_selectors)
                    .await?
                    .is_some()
            {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            cx.env.sleep(PAYMENT_POLL.min(remaining)).await?;
        }
    }
}

#[async_trait]
impl StateHandler for ConfirmHandler {
    fn id(&self) -> StateId {
        StateId::Confirm
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::Payment]
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        let max = cx.site.retry.max_attempts.confirm.max(1);
        let selectors = cx.site.selectors.confirm_button.joined();
        let mut failure = None;

        for attempt in 0..max {
            match self.locate(cx).await? {
                Located::Ready(button) => {
                    cx.env.scroll_into_view(&button).await?;
                    match cx.env.click(&button, cx.site.timing.click_delay()).await {
                        Ok(()) => {
                            cx.info("CONFIRM_CLICKED", json!({ "attempt": attempt + 1 }));
                            if self.reached_payment(cx).await? {
                                return Ok(Some(Next::to(StateId::Payment, "payment page reached")));
                            }
                            cx.warn("PAYMENT_PAGE_MISSING", json!({ "attempt": attempt + 1 }));
                            failure = Some(AutomationError::recoverable(
                                ErrorKind::ElementNotFound,
                                "payment page did not load after confirming",
                            ));
                        }
                        Err(err) if err.is_interrupted() => return Err(err.into()),
                        Err(err) => {
                            cx.warn(
                                "CONFIRM_CLICK_FAILED",
                                json!({ "attempt": attempt + 1, "error": err.to_string() }),
                            );
                            failure = Some(
                                AutomationError::recoverable(ErrorKind::ButtonDisabled, err.to_string())
                                    .with_button(button),
                            );
                        }
                    }
                }
                Located::Disabled(button) => {
                    cx.warn("CONFIRM_DISABLED", json!({ "attempt": attempt + 1 }));
                    failure = Some(
                        AutomationError::recoverable(ErrorKind::ButtonDisabled, "confirm button is disabled")
                            .with_button(button),
                    );
                }
                Located::Missing => {
                    cx.warn("CONFIRM_MISSING", json!({ "attempt": attempt + 1 }));
                    failure = Some(
                        AutomationError::recoverable(ErrorKind::ElementNotFound, "confirm button not found")
                            .with_selector(selectors.clone()),
                    );
                }
            }

            if attempt + 1 < max {
                let delay = cx.site.retry.backoff(cx.site.timing.retry_delay(), attempt);
                cx.env.sleep(delay).await?;
            }
        }
        Err(failure.unwrap_or_else(|| {
            AutomationError::recoverable(ErrorKind::ElementNotFound, "confirm button not found")
                .with_selector(selectors)
        }))
    }
}
