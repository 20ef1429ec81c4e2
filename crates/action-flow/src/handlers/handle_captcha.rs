use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sword_action_primitives::{ActionError, Overlay, OverlayKind};
use sword_core_types::{AutomationError, ErrorKind, StateId};
use sword_event_bus::SupervisorEvent;
use sword_state_center::PersistedRun;
use tokio::time::Instant;

use crate::handler::{HandlerCx, Next, StateHandler, Subscription};

pub const CAPTCHA_OVERLAY_ID: &str = "sword-captcha";
const POLL: Duration = Duration::from_millis(500);

/// Holds the flow while the user solves a CAPTCHA by hand.
#[derive(Default)]
pub struct HandleCaptchaHandler {
    ticker: Option<Subscription>,
    entered_at: Option<Instant>,
}

impl HandleCaptchaHandler {
    async fn still_blocked(&self, cx: &HandlerCx<'_>) -> Result<bool, ActionError> {
        let captcha = &cx.site.captcha;
        if cx.env.find_first_interactable(&captcha.selectors).await?.is_some() {
            return Ok(true);
        }
        if cx.env.page_has_any_text(&captcha.texts).await? {
            return Ok(true);
        }
        if captcha.url_marker.is_empty() {
            return Ok(false);
        }
        cx.env.url_contains(&captcha.url_marker).await
    }
}

#[async_trait]
impl StateHandler for HandleCaptchaHandler {
    fn id(&self) -> StateId {
        StateId::HandleCaptcha
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::ClickStart]
    }

    async fn on_enter(&mut self, cx: &mut HandlerCx<'_>, _data: &Value) -> Result<(), AutomationError> {
        if let Some(config) = cx.context.config().cloned() {
            cx.persist(PersistedRun::running(config)).await;
        }
        cx.warn("CAPTCHA_DETECTED", json!({ "previous": cx.previous }));

        let overlay = Overlay::new(CAPTCHA_OVERLAY_ID, OverlayKind::Alert, "CAPTCHA")
            .line("Solve the security check to continue the booking");
        cx.overlay(&overlay).await;
        cx.emit(SupervisorEvent::ManualActionRequired {
            action: "SOLVE_CAPTCHA".to_string(),
            message: "Solve the CAPTCHA on the booking page".to_string(),
        })
        .await;

        if let Some(input) = cx.env.find_first_interactable(&cx.site.captcha.input).await? {
            if let Err(err) = cx.env.focus_and_highlight(&input).await {
                cx.debug("CAPTCHA_FOCUS_FAILED", json!({ "error": err.to_string() }));
            }
        }

        self.entered_at = Some(Instant::now());
        self.ticker = Some(Subscription::every(POLL, cx.env.cancel_token()));
        Ok(())
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        let started = self.entered_at.unwrap_or_else(Instant::now);
        let timeout = cx.site.captcha.manual_timeout();
        loop {
            let Some(ticker) = self.ticker.as_mut() else {
                return Err(AutomationError::fatal(ErrorKind::Unknown, "captcha wait without a ticker"));
            };
            ticker.tick().await?;

            if !self.still_blocked(cx).await? {
                let waited = started.elapsed();
                cx.info(
                    "CAPTCHA_RESOLVED",
                    json!({ "waitedMs": u64::try_from(waited.as_millis()).unwrap_or(u64::MAX) }),
                );
                // CLICK_START re-detects zones, seats or payment from here.
                return Ok(Some(Next::to(StateId::ClickStart, "captcha solved")));
            }

            if started.elapsed() >= timeout {
                return Err(AutomationError::recoverable(
                    ErrorKind::CaptchaFailed,
                    format!("not solved within {}s", timeout.as_secs()),
                )
                .with_selector(cx.site.captcha.selectors.joined()));
            }
        }
    }

    async fn on_exit(&mut self, cx: &mut HandlerCx<'_>) {
        self.ticker = None;
        self.entered_at = None;
        cx.clear_overlay(CAPTCHA_OVERLAY_ID).await;
    }
}
