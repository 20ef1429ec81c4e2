use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sword_action_primitives::ActionError;
use sword_core_types::{AutomationError, ElementHandle, ErrorKind, StateId};

use crate::handler::{HandlerCx, Next, StateHandler};

const SETTLE_AFTER_CLOSE: Duration = Duration::from_millis(300);

/// Dismisses notice dialogs until none is left.
///
/// A fingerprint dismissed earlier in the same visit that shows up again
/// means closing does not work: that is a popup loop, handed to recovery
/// with the popup attached. Past the per-run ceiling every remaining popup
/// is removed and the flow moves on without an error.
#[derive(Debug, Default)]
pub struct HandlePopupHandler {
    dismissed: HashSet<String>,
}

impl HandlePopupHandler {
    async fn dismiss(&self, cx: &HandlerCx<'_>, popup: &ElementHandle) -> Result<(), ActionError> {
        let delay = cx.site.timing.click_delay();
        let close = cx
            .env
            .find_first_interactable_in(&cx.site.selectors.popup_close, Some(popup))
            .await?;
        match close {
            Some(button) => cx.env.click(&button, delay).await,
            // No close control: click the overlay itself.
            None => cx.env.click(popup, delay).await,
        }
    }
}

#[async_trait]
impl StateHandler for HandlePopupHandler {
    fn id(&self) -> StateId {
        StateId::HandlePopup
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::SelectZone]
    }

    async fn on_enter(&mut self, _cx: &mut HandlerCx<'_>, _data: &Value) -> Result<(), AutomationError> {
        self.dismissed.clear();
        Ok(())
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        let ceiling = cx.site.retry.max_popups;
        loop {
            let Some(popup) = cx.env.find_first_interactable(&cx.site.selectors.popup).await? else {
                break;
            };
            if cx.context.popups_handled() >= ceiling {
                let removed = cx.env.remove_all(&cx.site.selectors.popup).await?;
                cx.warn(
                    "POPUP_CEILING_REACHED",
                    json!({ "handled": cx.context.popups_handled(), "removed": removed }),
                );
                return Ok(Some(Next::to(StateId::SelectZone, "forced continue")));
            }

            let fingerprint = cx.env.fingerprint(&popup).await?.unwrap_or_default();
            if !self.dismissed.insert(fingerprint.clone()) {
                cx.warn("POPUP_LOOP_DETECTED", json!({ "fingerprint": fingerprint }));
                return Err(AutomationError::recoverable(
                    ErrorKind::PopupLoop,
                    format!("popup {fingerprint} reappeared after closing"),
                )
                .with_popup(popup));
            }

            cx.info(
                "POPUP_DETECTED",
                json!({ "fingerprint": fingerprint, "handled": cx.context.popups_handled() }),
            );
            match self.dismiss(cx, &popup).await {
                Ok(()) => {}
                Err(err) if err.is_interrupted() => return Err(err.into()),
                Err(err) => cx.warn(
                    "POPUP_CLOSE_FAILED",
                    json!({ "fingerprint": fingerprint, "error": err.to_string() }),
                ),
            }
            cx.context.note_popup();
            cx.env.sleep(SETTLE_AFTER_CLOSE).await?;
        }

        let handled = cx.context.popups_handled();
        cx.info("POPUPS_CLEARED", json!({ "handled": handled }));
        Ok(Some(
            Next::to(StateId::SelectZone, "popups cleared").with_data(json!({ "popupsHandled": handled })),
        ))
    }

    async fn on_exit(&mut self, _cx: &mut HandlerCx<'_>) {
        self.dismissed.clear();
    }
}
