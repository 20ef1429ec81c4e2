use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sword_core_types::{AutomationError, ErrorKind, StateId};
use sword_event_bus::SupervisorEvent;
use tokio::time::Instant;

use crate::handler::{HandlerCx, Next, StateHandler, Subscription};

const TICK: Duration = Duration::from_millis(100);
const SETTLE_AFTER_REFRESH: Duration = Duration::from_secs(1);

/// Counts down to the opening time, reporting progress once per second.
#[derive(Default)]
pub struct WaitOpenHandler {
    ticker: Option<Subscription>,
    deadline: Option<Instant>,
    last_second: Option<i64>,
}

/// `H:MM:SS`, rounded down to the second.
pub fn format_remaining(remaining_ms: i64) -> String {
    let total = remaining_ms.max(0) / 1_000;
    format!("{}:{:02}:{:02}", total / 3_600, (total % 3_600) / 60, total % 60)
}

#[async_trait]
impl StateHandler for WaitOpenHandler {
    fn id(&self) -> StateId {
        StateId::WaitOpen
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::ClickStart, StateId::Idle]
    }

    async fn on_enter(&mut self, cx: &mut HandlerCx<'_>, data: &Value) -> Result<(), AutomationError> {
        let target = data
            .get("targetTime")
            .and_then(Value::as_i64)
            .or_else(|| cx.context.config().and_then(|config| config.target_time))
            .ok_or_else(|| AutomationError::fatal(ErrorKind::Unknown, "no target time to wait for"))?;
        let remaining = (target - Utc::now().timestamp_millis()).max(0);
        // Measured on the runtime clock from here on.
        self.deadline = Some(Instant::now() + Duration::from_millis(remaining as u64));
        self.last_second = None;
        self.ticker = Some(Subscription::every(TICK, cx.env.cancel_token()));
        cx.info("WAIT_OPEN_STARTED", json!({ "targetTime": target, "remainingMs": remaining }));
        Ok(())
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        let deadline = self.deadline.unwrap_or_else(Instant::now);
        let Some(ticker) = self.ticker.as_mut() else {
            return Err(AutomationError::fatal(ErrorKind::Unknown, "wait started without a ticker"));
        };

        loop {
            ticker.tick().await?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let remaining_ms = i64::try_from(remaining.as_millis()).unwrap_or(i64::MAX);
            let second = remaining_ms / 1_000;
            if self.last_second != Some(second) {
                self.last_second = Some(second);
                cx.emit(SupervisorEvent::Progress {
                    remaining_ms,
                    formatted: format_remaining(remaining_ms),
                })
                .await;
            }
        }

        let refresh = cx.context.config().map_or(false, |config| config.auto_refresh)
            && cx.site.features.auto_refresh;
        if refresh {
            cx.info("AUTO_REFRESH", json!({}));
            cx.env.reload().await?;
            if let Err(err) = cx.env.wait_for_page_load(cx.site.timing.page_load_timeout()).await {
                if err.is_interrupted() {
                    return Err(err.into());
                }
                cx.warn("AUTO_REFRESH_SLOW", json!({ "error": err.to_string() }));
            }
            cx.env.sleep(SETTLE_AFTER_REFRESH).await?;
        }

        cx.info("BOOKING_OPENED", json!({ "refreshed": refresh }));
        Ok(Some(Next::to(StateId::ClickStart, "booking opened")))
    }

    async fn on_exit(&mut self, _cx: &mut HandlerCx<'_>) {
        self.ticker = None;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_remaining(3_725_000), "1:02:05");
        assert_eq!(format_remaining(59_999), "0:00:59");
        assert_eq!(format_remaining(-10), "0:00:00");
    }
}
