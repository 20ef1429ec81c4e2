//! The eleven state handlers

mod click_start;
mod confirm;
mod error;
mod failed;
mod handle_captcha;
mod handle_popup;
mod idle;
mod payment;
mod select_seat;
mod select_zone;
mod wait_open;

pub use click_start::ClickStartHandler;
pub use confirm::ConfirmHandler;
pub use error::ErrorHandler;
pub use failed::{FailedHandler, FAILURE_OVERLAY_ID};
pub use handle_captcha::{HandleCaptchaHandler, CAPTCHA_OVERLAY_ID};
pub use handle_popup::HandlePopupHandler;
pub use idle::IdleHandler;
pub use payment::{PaymentHandler, SUCCESS_OVERLAY_ID};
pub use select_seat::SelectSeatHandler;
pub use select_zone::SelectZoneHandler;
pub use wait_open::{format_remaining, WaitOpenHandler};

use std::sync::Arc;

use crate::handler::StateHandler;
use crate::recovery::RecoveryEngine;

/// One handler per state, ERROR backed by the standard recovery table.
pub fn standard() -> Vec<Box<dyn StateHandler>> {
    with_recovery(Arc::new(RecoveryEngine::standard()))
}

pub fn with_recovery(recovery: Arc<RecoveryEngine>) -> Vec<Box<dyn StateHandler>> {
    vec![
        Box::new(IdleHandler),
        Box::new(WaitOpenHandler::default()),
        Box::new(ClickStartHandler),
        Box::new(HandlePopupHandler::default()),
        Box::new(SelectZoneHandler),
        Box::new(SelectSeatHandler),
        Box::new(ConfirmHandler),
        Box::new(HandleCaptchaHandler::default()),
        Box::new(PaymentHandler),
        Box::new(ErrorHandler::new(recovery)),
        Box::new(FailedHandler),
    ]
}
