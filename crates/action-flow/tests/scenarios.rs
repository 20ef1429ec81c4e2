//! End-to-end runs of the standard handlers against the mock ticket page.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{drain, engine, engine_for, entries, logged};
use sword_action_primitives::simulated::{MockTicketPage, SimulatedPage, MOCK_COMPLETE_URL, MOCK_URL};
use sword_action_primitives::ActionError;
use sword_core_types::{ErrorKind, RunConfig, StateId};
use sword_event_bus::SupervisorEvent;
use sword_site_config::defaults::mocktest;
use tokio_util::sync::CancellationToken;

use StateId::*;

#[tokio::test(start_paused = true)]
async fn clean_run_reaches_payment() {
    let page = MockTicketPage::new().build();
    let mut fsm = engine(&page);
    let mut events = fsm.services().events.subscribe();

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    assert_eq!(
        fsm.history().path(),
        vec![Idle, ClickStart, SelectZone, SelectSeat, Confirm, Payment]
    );
    assert_eq!(fsm.context().retry_count(), 0);
    assert_eq!(fsm.context().selected_seats().len(), 1);
    assert_eq!(page.url(), MOCK_COMPLETE_URL);
    assert!(page.has_class(".pay-method", "selected"));
    assert!(page.overlay("sword-success").is_some());

    let events = drain(&mut events);
    let succeeded = events
        .iter()
        .find_map(|event| match event {
            SupervisorEvent::AutomationSucceeded { seat_count, .. } => Some(*seat_count),
            _ => None,
        })
        .expect("success event published");
    assert_eq!(succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn popups_are_dismissed_in_order() {
    let page = MockTicketPage::new().popups(2).build();
    let mut fsm = engine(&page);

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    assert_eq!(
        fsm.history().path(),
        vec![Idle, ClickStart, HandlePopup, SelectZone, SelectSeat, Confirm, Payment]
    );
    assert_eq!(fsm.context().popups_handled(), 2);
    assert!(page.first(".popup").is_none());
}

#[tokio::test(start_paused = true)]
async fn contested_seat_is_skipped_without_leaving_seat_selection() {
    let page = MockTicketPage::new().taken(&["A-6"]).build();
    let mut fsm = engine(&page);

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    assert!(fsm.context().is_unavailable("A-6"));
    let seats: Vec<&str> = fsm
        .context()
        .selected_seats()
        .iter()
        .map(|seat| seat.id.as_str())
        .collect();
    assert_eq!(seats, vec!["B-6"]);
    assert_eq!(entries(&fsm, SelectZone), 1);
    assert_eq!(entries(&fsm, Error), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_reserve_button_exhausts_retries_and_fails() {
    let page = SimulatedPage::new(MOCK_URL);
    let mut fsm = engine(&page);
    let mut events = fsm.services().events.subscribe();

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Failed);
    assert_eq!(entries(&fsm, Error), 6);
    assert_eq!(entries(&fsm, ClickStart), 6);
    assert_eq!(fsm.context().attempts(ErrorKind::ElementNotFound), 6);
    assert_eq!(fsm.context().error_total(), 6);
    assert!(page.overlay("sword-failure").is_some());

    let failed = drain(&mut events)
        .into_iter()
        .find_map(|event| match event {
            SupervisorEvent::AutomationFailed { reason, last_error, .. } => Some((reason, last_error)),
            _ => None,
        })
        .expect("failure event published");
    let last = failed.1.expect("last error recorded");
    assert_eq!(last.kind, ErrorKind::ElementNotFound);
}

#[tokio::test(start_paused = true)]
async fn captcha_waits_for_the_user() {
    let page = MockTicketPage::new().captcha(true).build();
    let mut fsm = engine(&page);
    let mut events = fsm.services().events.subscribe();

    let user = page.clone();
    let (parked, solved) = tokio::join!(
        fsm.start(RunConfig::with_seats(1), CancellationToken::new()),
        async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            user.user_click("#btnCaptcha")
        }
    );

    assert!(solved);
    assert_eq!(parked.unwrap(), Payment);
    assert_eq!(
        fsm.history().path(),
        vec![Idle, ClickStart, HandleCaptcha, ClickStart, SelectZone, SelectSeat, Confirm, Payment]
    );
    assert!(page.overlay("sword-captcha").is_none());
    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        SupervisorEvent::ManualActionRequired { action, .. } if action == "SOLVE_CAPTCHA"
    )));
}

#[tokio::test(start_paused = true)]
async fn sticky_popup_is_removed_by_recovery() {
    let page = MockTicketPage::new().sticky_popup().build();
    let mut fsm = engine(&page);

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    let path = fsm.history().path();
    assert_eq!(
        &path[..6],
        &[Idle, ClickStart, HandlePopup, Error, HandlePopup, SelectZone]
    );
    assert_eq!(fsm.context().attempts(ErrorKind::PopupLoop), 1);
    assert!(page.first(".popup").is_none());
}

#[tokio::test(start_paused = true)]
async fn two_seats_are_taken_side_by_side() {
    let page = MockTicketPage::new().build();
    let mut fsm = engine(&page);

    let parked = fsm
        .start(RunConfig::with_seats(2), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    let seats = fsm.context().selected_seats();
    assert_eq!(seats.len(), 2);
    assert_eq!(seats[0].row, seats[1].row);
    assert_eq!((seats[1].position - seats[0].position).abs(), 1);
}

#[tokio::test(start_paused = true)]
async fn solved_captcha_goes_back_through_click_start() {
    let page = MockTicketPage::new().captcha(true).build();
    let mut fsm = engine(&page);

    let user = page.clone();
    let (parked, solved) = tokio::join!(
        fsm.start(RunConfig::with_seats(1), CancellationToken::new()),
        async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            // The site shows the zone list as soon as the check passes.
            user.with_dom(|dom| dom.show(".zone-list"));
            user.user_click("#btnCaptcha")
        }
    );

    assert!(solved);
    assert_eq!(parked.unwrap(), Payment);
    let path = fsm.history().path();
    let at = path.iter().position(|state| *state == HandleCaptcha).unwrap();
    assert_eq!(path[at + 1], ClickStart);
    assert_eq!(path[at + 2], SelectZone);
    assert_eq!(logged(&fsm, "CLICK_START_SKIPPED"), 1);
}

#[tokio::test(start_paused = true)]
async fn future_opening_time_counts_down_before_clicking() {
    let page = MockTicketPage::new().build();
    let mut fsm = engine(&page);
    let mut events = fsm.services().events.subscribe();

    let config = RunConfig {
        target_time: Some(Utc::now().timestamp_millis() + 3_500),
        seat_count: 1,
        auto_refresh: false,
    };
    let parked = fsm.start(config, CancellationToken::new()).await.unwrap();

    assert_eq!(parked, Payment);
    assert_eq!(&fsm.history().path()[..3], &[Idle, WaitOpen, ClickStart]);
    let countdown: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SupervisorEvent::Progress { formatted, .. } => Some(formatted),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, vec!["0:00:03", "0:00:02", "0:00:01", "0:00:00"]);
    assert_eq!(page.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn auto_refresh_reloads_at_opening_time() {
    let page = MockTicketPage::new().build();
    let mut site = mocktest();
    site.features.auto_refresh = true;
    let mut fsm = engine_for(&page, site);

    let config = RunConfig {
        target_time: Some(Utc::now().timestamp_millis() + 1_500),
        seat_count: 1,
        auto_refresh: true,
    };
    let parked = fsm.start(config, CancellationToken::new()).await.unwrap();

    assert_eq!(parked, Payment);
    assert_eq!(page.reloads(), 1);
    assert_eq!(logged(&fsm, "AUTO_REFRESH"), 1);
    assert_eq!(&fsm.history().path()[..3], &[Idle, WaitOpen, ClickStart]);
}

#[tokio::test(start_paused = true)]
async fn payment_step_failure_leaves_the_run_in_payment() {
    let page = MockTicketPage::new().build();
    let mut fsm = engine(&page);
    let flaky = page.clone();
    fsm.on_transition(move |record| {
        if record.to == Payment {
            flaky.fail_next_query("button", ActionError::Detached("payment method".into()));
        }
        Ok(())
    });

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    assert_eq!(entries(&fsm, Error), 0);
    assert_eq!(logged(&fsm, "PAYMENT_STEP_FAILED"), 1);
    assert_ne!(page.url(), MOCK_COMPLETE_URL);
    assert!(page.overlay("sword-success").is_some());
}

#[tokio::test(start_paused = true)]
async fn page_swapped_mid_run_resumes_at_click_start() {
    let page = MockTicketPage::new().build();
    page.fail_next_query(".zone", ActionError::StaleRoute("document replaced".into()));
    let mut fsm = engine(&page);

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    assert_eq!(
        fsm.history().path(),
        vec![Idle, ClickStart, Error, ClickStart, SelectZone, SelectSeat, Confirm, Payment]
    );
    assert_eq!(fsm.context().attempts(ErrorKind::PageReload), 1);
    let resumed = fsm.history().iter().nth(2).unwrap();
    assert_eq!(resumed.reason, "resume after PAGE_RELOAD");
}

#[tokio::test(start_paused = true)]
async fn popups_up_to_the_ceiling_are_cleared_normally() {
    let page = MockTicketPage::new().popups(5).build();
    let mut fsm = engine(&page);

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    assert_eq!(fsm.context().popups_handled(), 5);
    assert_eq!(logged(&fsm, "POPUP_CEILING_REACHED"), 0);
    let left = fsm
        .history()
        .iter()
        .find(|record| record.from == HandlePopup)
        .unwrap();
    assert_eq!(left.reason, "popups cleared");
}

#[tokio::test(start_paused = true)]
async fn popups_past_the_ceiling_force_a_continue() {
    let page = MockTicketPage::new().popups(7).build();
    let mut fsm = engine(&page);

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, Payment);
    assert_eq!(fsm.context().popups_handled(), 5);
    assert_eq!(logged(&fsm, "POPUP_CEILING_REACHED"), 1);
    let left = fsm
        .history()
        .iter()
        .find(|record| record.from == HandlePopup)
        .unwrap();
    assert_eq!(left.reason, "forced continue");
    assert!(page.first(".popup").is_none());
}
