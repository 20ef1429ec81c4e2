use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sword_action_primitives::{ActionError, Overlay, OverlayKind};
use sword_core_types::{AutomationError, StateId};
use sword_event_bus::SupervisorEvent;
use sword_site_config::PaymentStep;
use sword_state_center::PersistedRun;
use tokio::time::Instant;
use tracing::info;

use crate::handler::{HandlerCx, Next, StateHandler};

pub const SUCCESS_OVERLAY_ID: &str = "sword-success";
const DIALOG_POLL: Duration = Duration::from_millis(200);
const SETTLE_AFTER_PAY: Duration = Duration::from_millis(500);

/// Success terminal. Walks whatever payment sub-steps it recognizes and
/// leaves the rest to the user: failures here are logged, never raised.
#[derive(Debug, Default)]
pub struct PaymentHandler;

impl PaymentHandler {
    async fn step_visible(&self, cx: &HandlerCx<'_>, step: &PaymentStep) -> Result<bool, ActionError> {
        if !step.marker_url.is_empty() && cx.env.url_contains(&step.marker_url).await? {
            return Ok(true);
        }
        if step.marker_text.is_empty() {
            return Ok(false);
        }
        cx.env.page_has_text(&step.marker_text).await
    }

    /// Preferred option by label, else the first fallback control.
    async fn choose(&self, cx: &HandlerCx<'_>, step: &PaymentStep) -> Result<Option<String>, ActionError> {
        let delay = cx.site.timing.click_delay();
        if let Some((option, label)) = cx.env.find_clickable_by_any_text(&step.options).await? {
            cx.env.click(&option, delay).await?;
            return Ok(Some(label.to_string()));
        }
        if let Some(option) = cx.env.find_first_interactable(&step.fallback).await? {
            cx.env.click(&option, delay).await?;
            return Ok(Some(step.fallback.first().unwrap_or_default().to_string()));
        }
        Ok(None)
    }

    async fn confirm_dialog(&self, cx: &HandlerCx<'_>) -> Result<bool, ActionError> {
        let deadline = Instant::now() + cx.site.timing.popup_timeout();
        loop {
            if let Some((button, label)) = cx
                .env
                .find_clickable_by_any_text(&cx.site.payment.dialog_confirm)
                .await?
            {
                cx.env.click(&button, cx.site.timing.click_delay()).await?;
                cx.info("PAYMENT_DIALOG_CONFIRMED", json!({ "text": label }));
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            cx.env.sleep(DIALOG_POLL.min(remaining)).await?;
        }
    }

    async fn run_steps(&self, cx: &HandlerCx<'_>) -> Result<(), ActionError> {
        let flow = &cx.site.payment;
        let mut recognized = false;
        for (name, step) in [
            ("discount", &flow.discount),
            ("delivery", &flow.delivery),
            ("method", &flow.method),
        ] {
            if !self.step_visible(cx, step).await? {
                continue;
            }
            recognized = true;
            match self.choose(cx, step).await? {
                Some(option) => cx.info("PAYMENT_OPTION_SELECTED", json!({ "step": name, "option": option })),
                None => cx.warn("PAYMENT_OPTION_MISSING", json!({ "step": name })),
            }
            cx.env.sleep(cx.site.timing.click_delay()).await?;
        }

        if let Some((button, label)) = cx.env.find_clickable_by_any_text(&flow.pay_buttons).await? {
            cx.env.click(&button, cx.site.timing.click_delay()).await?;
            cx.info("PAY_BUTTON_CLICKED", json!({ "text": label }));
            cx.env.sleep(SETTLE_AFTER_PAY).await?;
            if !self.confirm_dialog(cx).await? {
                cx.debug("PAYMENT_DIALOG_ABSENT", json!({}));
            }
            return Ok(());
        }

        if !recognized {
            let next = match cx.env.find_first_interactable(&flow.next_step_selectors).await? {
                Some(button) => Some(button),
                None => cx
                    .env
                    .find_clickable_by_any_text(&flow.next_step_texts)
                    .await?
                    .map(|(button, _)| button),
            };
            match next {
                Some(button) => {
                    cx.env.click(&button, cx.site.timing.click_delay()).await?;
                    cx.info("PAYMENT_NEXT_STEP", json!({}));
                }
                None => cx.info("PAYMENT_MANUAL", json!({ "message": "no known payment step on page" })),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StateHandler for PaymentHandler {
    fn id(&self) -> StateId {
        StateId::Payment
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::Idle]
    }

    async fn on_enter(&mut self, cx: &mut HandlerCx<'_>, _data: &Value) -> Result<(), AutomationError> {
        cx.persist(PersistedRun::stopped(cx.context.config().cloned())).await;
        let seats = cx.context.selected_seats().to_vec();
        let elapsed_ms = cx.context.elapsed_ms().unwrap_or(0);
        info!(elapsed_ms, seats = seats.len(), "seats secured");
        cx.info(
            "PAYMENT_SUCCESS",
            json!({ "elapsedMs": elapsed_ms, "seats": seats, "retryCount": cx.context.retry_count() }),
        );
        cx.emit(SupervisorEvent::AutomationSucceeded {
            elapsed_ms,
            seat_count: seats.len(),
            seats: seats.clone(),
        })
        .await;

        let ids: Vec<&str> = seats.iter().map(|seat| seat.id.as_str()).collect();
        let overlay = Overlay::new(SUCCESS_OVERLAY_ID, OverlayKind::Success, "Seats secured")
            .line(format!("Seats: {}", ids.join(", ")))
            .line(format!("Time: {:.1}s", elapsed_ms as f64 / 1000.0));
        cx.overlay(&overlay).await;
        Ok(())
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        match self.run_steps(cx).await {
            Ok(()) => {}
            Err(err) if err.is_interrupted() => return Err(err.into()),
            Err(err) => cx.warn("PAYMENT_STEP_FAILED", json!({ "error": err.to_string() })),
        }
        Ok(None)
    }

    async fn on_exit(&mut self, cx: &mut HandlerCx<'_>) {
        cx.clear_overlay(SUCCESS_OVERLAY_ID).await;
    }
}
