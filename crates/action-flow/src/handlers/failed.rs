use async_trait::async_trait;
use serde_json::{json, Value};
use sword_action_primitives::{Overlay, OverlayKind};
use sword_core_types::{AutomationError, StateId};
use sword_event_bus::SupervisorEvent;
use sword_state_center::PersistedRun;
use tracing::error;

use crate::handler::{HandlerCx, StateHandler};

pub const FAILURE_OVERLAY_ID: &str = "sword-failure";

/// Failure terminal: summarize, tell the supervisor, show the cue.
#[derive(Debug, Default)]
pub struct FailedHandler;

#[async_trait]
impl StateHandler for FailedHandler {
    fn id(&self) -> StateId {
        StateId::Failed
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::Idle]
    }

    async fn on_enter(&mut self, cx: &mut HandlerCx<'_>, data: &Value) -> Result<(), AutomationError> {
        let reason = data
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("automation failed")
            .to_string();
        cx.persist(PersistedRun::stopped(cx.context.config().cloned())).await;

        let last_error = cx.context.last_error().cloned();
        let errors: Vec<_> = cx.context.errors().cloned().collect();
        error!(%reason, retries = cx.context.retry_count(), "automation failed");
        cx.error(
            "AUTOMATION_FAILED",
            json!({
                "reason": reason,
                "error": data.get("error"),
                "elapsedMs": cx.context.elapsed_ms(),
                "retryCount": cx.context.retry_count(),
                "errors": errors,
            }),
        );

        cx.emit(SupervisorEvent::AutomationFailed {
            reason: reason.clone(),
            last_error: last_error.clone(),
            error_log: cx.services.run_log.error_tail(),
        })
        .await;

        let mut overlay = Overlay::new(FAILURE_OVERLAY_ID, OverlayKind::Failure, "Automation failed")
            .line(reason);
        if let Some(last) = last_error {
            overlay = overlay.line(format!("{}: {}", last.kind, last.message));
        }
        cx.overlay(&overlay).await;
        Ok(())
    }

    fn auto_execute(&self) -> bool {
        false
    }

    async fn on_exit(&mut self, cx: &mut HandlerCx<'_>) {
        cx.clear_overlay(FAILURE_OVERLAY_ID).await;
    }
}
