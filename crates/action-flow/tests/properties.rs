//! Engine guarantees that hold regardless of what the page does.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{engine, engine_with, Stub, Trace, Traced};
use serde_json::Value;
use sword_action_flow::handlers::{ErrorHandler, FailedHandler, IdleHandler};
use sword_action_flow::{FlowError, FlowServices, Fsm, Next};
use sword_action_primitives::simulated::{MockTicketPage, SimulatedPage, MOCK_URL};
use sword_action_primitives::Environment;
use sword_core_types::{RunConfig, StateId};
use sword_site_config::defaults::mocktest;
use tokio_util::sync::CancellationToken;

fn bare(page: &SimulatedPage, services: FlowServices) -> Fsm {
    Fsm::new(Environment::new(Arc::new(page.clone())), Arc::new(mocktest()), services)
}

fn logged(services: &FlowServices, event: &str) -> usize {
    services
        .run_log
        .all()
        .iter()
        .filter(|record| record.event == event)
        .count()
}

#[tokio::test(start_paused = true)]
async fn exit_runs_before_the_next_enter() {
    let page = MockTicketPage::new().popups(1).build();
    let trace = Trace::default();
    let mut fsm = bare(&page, FlowServices::in_memory());
    for handler in Traced::all(&trace) {
        fsm.register_state(handler).unwrap();
    }

    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(parked, StateId::Payment);

    let trace = trace.lock().clone();
    let path = fsm.history().path();
    assert_eq!(trace.len(), (path.len() - 1) * 2);
    for (step, pair) in path.windows(2).enumerate() {
        assert_eq!(trace[step * 2], format!("exit:{}", pair[0]));
        assert_eq!(trace[step * 2 + 1], format!("enter:{}", pair[1]));
    }
}

#[tokio::test(start_paused = true)]
async fn external_transition_outside_the_table_changes_nothing() {
    let page = MockTicketPage::new().build();
    let services = FlowServices::in_memory();
    let mut fsm = engine_with(&page, services.clone());
    fsm.start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    let recorded = fsm.history().len();
    let accepted = fsm
        .transition(StateId::SelectZone, Value::Null, "operator")
        .await
        .unwrap();

    assert!(!accepted);
    assert_eq!(fsm.current(), StateId::Payment);
    assert_eq!(fsm.history().len(), recorded);
    assert_eq!(logged(&services, "TRANSITION_BLOCKED"), 1);
}

#[tokio::test(start_paused = true)]
async fn handler_requesting_a_forbidden_state_fails_the_run() {
    let page = SimulatedPage::new(MOCK_URL);
    let services = FlowServices::in_memory();
    let mut fsm = bare(&page, services.clone());
    fsm.register_state(Box::new(Stub::forwarding(
        StateId::Idle,
        &[StateId::ClickStart],
        Next::to(StateId::Payment, "skip ahead"),
    )))
    .unwrap();
    fsm.register_state(Box::new(ErrorHandler::default())).unwrap();
    fsm.register_state(Box::new(FailedHandler)).unwrap();

    let parked = fsm
        .start(RunConfig::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, StateId::Failed);
    assert_eq!(fsm.history().path(), vec![StateId::Idle, StateId::Error, StateId::Failed]);
    assert_eq!(logged(&services, "TRANSITION_BLOCKED"), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_target_is_rejected() {
    let page = SimulatedPage::new(MOCK_URL);
    let mut fsm = bare(&page, FlowServices::in_memory());
    fsm.register_state(Box::new(IdleHandler)).unwrap();

    let err = fsm
        .transition(StateId::Confirm, Value::Null, "operator")
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::UnknownState(StateId::Confirm)));
    assert_eq!(fsm.current(), StateId::Idle);
}

#[tokio::test(start_paused = true)]
async fn reset_is_idempotent_and_keeps_the_config() {
    let page = MockTicketPage::new().taken(&["A-6"]).build();
    let mut fsm = engine(&page);
    fsm.start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    fsm.reset().await;
    let after_first = fsm.history().len();
    fsm.reset().await;

    assert_eq!(fsm.current(), StateId::Idle);
    assert_eq!(fsm.history().len(), after_first);
    assert_eq!(fsm.context().retry_count(), 0);
    assert_eq!(fsm.context().error_total(), 0);
    assert!(fsm.context().selected_seats().is_empty());
    assert!(!fsm.context().is_unavailable("A-6"));
    assert_eq!(fsm.context().seat_count(), 1);
    assert_eq!(fsm.view().read().current, StateId::Idle);
}

#[tokio::test(start_paused = true)]
async fn cancellation_parks_the_run_in_idle() {
    let page = MockTicketPage::new().captcha(true).build();
    let mut fsm = engine(&page);
    let token = CancellationToken::new();

    let stopper = token.clone();
    let (parked, _) = tokio::join!(
        fsm.start(RunConfig::with_seats(1), token),
        async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            stopper.cancel();
        }
    );

    assert_eq!(parked.unwrap(), StateId::Idle);
    assert_eq!(fsm.previous(), Some(StateId::HandleCaptcha));
    assert!(page.overlay("sword-captcha").is_none());

    // A fresh run starts from the parked engine.
    assert!(page.user_click("#btnCaptcha"));
    let parked = fsm
        .start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(parked, StateId::Payment);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let page = SimulatedPage::new(MOCK_URL);
    let mut fsm = engine(&page);
    let err = fsm.register_state(Box::new(IdleHandler)).unwrap_err();
    assert!(matches!(err, FlowError::DuplicateState(StateId::Idle)));
}

#[tokio::test]
async fn second_start_while_running_is_busy() {
    let page = SimulatedPage::new(MOCK_URL);
    let mut fsm = bare(&page, FlowServices::in_memory());
    fsm.register_state(Box::new(Stub::forwarding(
        StateId::Idle,
        &[StateId::ClickStart],
        Next::to(StateId::ClickStart, "go"),
    )))
    .unwrap();
    fsm.register_state(Box::new(Stub::parked(StateId::ClickStart, &[])))
        .unwrap();

    let parked = fsm
        .start(RunConfig::default(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(parked, StateId::ClickStart);

    let err = fsm
        .start(RunConfig::default(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Busy(StateId::ClickStart)));
}

#[tokio::test]
async fn invalid_config_is_rejected_before_anything_runs() {
    let page = SimulatedPage::new(MOCK_URL);
    let mut fsm = engine(&page);
    let err = fsm
        .start(RunConfig::with_seats(0), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));
    assert!(fsm.history().is_empty());
}

#[tokio::test]
async fn failing_listeners_never_stop_the_engine() {
    let page = SimulatedPage::new(MOCK_URL);
    let services = FlowServices::in_memory();
    let mut fsm = bare(&page, services.clone());
    fsm.register_state(Box::new(Stub::forwarding(
        StateId::Idle,
        &[StateId::ClickStart],
        Next::to(StateId::ClickStart, "go"),
    )))
    .unwrap();
    fsm.register_state(Box::new(Stub::parked(StateId::ClickStart, &[])))
        .unwrap();
    fsm.on_transition(|_| anyhow::bail!("listener refused"));
    fsm.on_transition(|_| panic!("listener exploded"));

    let parked = fsm
        .start(RunConfig::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(parked, StateId::ClickStart);
    assert_eq!(logged(&services, "EVENT_LISTENER_ERROR"), 2);
}

#[tokio::test(start_paused = true)]
async fn diagnostics_overlay_follows_transitions() {
    let page = MockTicketPage::new().build();
    let mut fsm = engine(&page);
    fsm.diagnostics_flag()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    fsm.start(RunConfig::with_seats(1), CancellationToken::new())
        .await
        .unwrap();

    let overlay = page
        .overlay(sword_action_flow::DIAGNOSTICS_OVERLAY_ID)
        .expect("diagnostics drawn");
    assert!(overlay.lines.iter().any(|line| line == "State: PAYMENT"));
}
