use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sword_core_types::{AutomationError, ErrorKind, StateId};

use crate::handler::{HandlerCx, Next, StateHandler};
use crate::recovery::{RecoveryEngine, RecoveryOutcome};

/// Transient dispatch state between a failure and the recovery decision.
pub struct ErrorHandler {
    recovery: Arc<RecoveryEngine>,
    pending: Option<AutomationError>,
}

impl ErrorHandler {
    pub fn new(recovery: Arc<RecoveryEngine>) -> Self {
        Self {
            recovery,
            pending: None,
        }
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(Arc::new(RecoveryEngine::standard()))
    }
}

#[async_trait]
impl StateHandler for ErrorHandler {
    fn id(&self) -> StateId {
        StateId::Error
    }

    fn allowed(&self) -> &'static [StateId] {
        &StateId::ALL
    }

    fn can_transition(&self, _target: StateId) -> bool {
        true
    }

    async fn on_enter(&mut self, _cx: &mut HandlerCx<'_>, data: &Value) -> Result<(), AutomationError> {
        let error = data
            .get("error")
            .cloned()
            .map(serde_json::from_value::<AutomationError>)
            .transpose()
            .map_err(|err| {
                AutomationError::fatal(ErrorKind::Unknown, format!("malformed error payload: {err}"))
            })?
            .ok_or_else(|| AutomationError::fatal(ErrorKind::Unknown, "ERROR entered without an error"))?;
        self.pending = Some(error);
        Ok(())
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        let Some(error) = self.pending.take() else {
            return Err(AutomationError::fatal(ErrorKind::Unknown, "no pending error"));
        };
        let failed_in = error.meta.state.or(cx.previous).unwrap_or(StateId::Idle);

        if !error.recoverable {
            cx.error(
                "UNRECOVERABLE_ERROR",
                json!({ "kind": error.kind, "message": error.message, "state": failed_in }),
            );
            let reason = format!("unrecoverable: {}", error.message);
            return Ok(Some(
                Next::to(StateId::Failed, reason.clone())
                    .with_data(json!({ "reason": reason, "error": error })),
            ));
        }

        let retry = cx.context.bump_retry();
        let outcome = self.recovery.handle(&error, cx).await?;
        cx.info(
            "RECOVERY_DECISION",
            json!({
                "kind": error.kind,
                "state": failed_in,
                "outcome": outcome.as_str(),
                "retryCount": retry,
                "attempts": cx.context.attempts(error.kind),
            }),
        );

        let next = match outcome {
            RecoveryOutcome::Retry => Next::to(failed_in, format!("retry after {}", error.kind)),
            RecoveryOutcome::Resume(state) => Next::to(state, format!("resume after {}", error.kind)),
            RecoveryOutcome::Fallback(StateId::Failed) => {
                let reason = if self.recovery.strategy(error.kind).is_some() {
                    format!("{} retries exhausted: {}", error.kind, error.message)
                } else {
                    format!("unrecoverable: no recovery for {}: {}", error.kind, error.message)
                };
                Next::to(StateId::Failed, reason.clone())
                    .with_data(json!({ "reason": reason, "error": error }))
            }
            RecoveryOutcome::Fallback(state) => Next::to(state, "forced continue"),
        };
        Ok(Some(next))
    }

    async fn on_exit(&mut self, _cx: &mut HandlerCx<'_>) {
        self.pending = None;
    }
}
