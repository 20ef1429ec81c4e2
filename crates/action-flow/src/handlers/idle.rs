use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sword_core_types::{AutomationError, ErrorKind, StateId};

use crate::handler::{HandlerCx, Next, StateHandler};

/// Parked until a start command; then decides whether to wait for opening.
#[derive(Debug, Default)]
pub struct IdleHandler;

#[async_trait]
impl StateHandler for IdleHandler {
    fn id(&self) -> StateId {
        StateId::Idle
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::WaitOpen, StateId::ClickStart]
    }

    fn auto_execute(&self) -> bool {
        false
    }

    async fn on_enter(&mut self, cx: &mut HandlerCx<'_>, _data: &Value) -> Result<(), AutomationError> {
        cx.debug("IDLE_ENTERED", json!({ "previous": cx.previous }));
        Ok(())
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        let config = cx.context.config().cloned().ok_or_else(|| {
            AutomationError::fatal(ErrorKind::Unknown, "start requested without a run configuration")
        })?;
        let now = Utc::now().timestamp_millis();
        match (config.target_time, config.remaining_ms(now)) {
            (Some(target), Some(remaining)) => {
                cx.info(
                    "WAITING_FOR_OPEN",
                    json!({ "targetTime": target, "remainingMs": remaining }),
                );
                Ok(Some(
                    Next::to(StateId::WaitOpen, "booking not open yet")
                        .with_data(json!({ "targetTime": target })),
                ))
            }
            _ => Ok(Some(Next::to(StateId::ClickStart, "start immediately"))),
        }
    }
}
