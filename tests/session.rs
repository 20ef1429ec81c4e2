//! Supervisor commands against a session on the simulated mock page.

use std::sync::Arc;
use std::time::Duration;

use sword_action_flow::{FlowError, FlowServices, DIAGNOSTICS_OVERLAY_ID};
use sword_action_primitives::simulated::{MockTicketPage, SimulatedPage, MOCK_URL};
use sword_action_primitives::Environment;
use sword_cli::{AutomationSession, RunStatus, SessionError, SupervisorHandle};
use sword_core_types::{RunConfig, StateId};
use sword_site_config::defaults::mocktest;
use sword_state_center::{InMemoryRunStateStore, PersistedRun, RunStateStore};

fn session(page: &SimulatedPage, store: Arc<InMemoryRunStateStore>) -> AutomationSession {
    AutomationSession::new(
        Environment::new(Arc::new(page.clone())),
        Arc::new(mocktest()),
        FlowServices::with_store(store),
    )
    .expect("standard handlers register once")
}

async fn wait_for(handle: &SupervisorHandle, state: StateId) {
    for _ in 0..600 {
        if handle.get_state().await.unwrap().current == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("session never reached {state}");
}

fn events_named(services: &FlowServices, name: &str) -> usize {
    services
        .run_log
        .all()
        .iter()
        .filter(|record| record.event == name)
        .count()
}

#[tokio::test(start_paused = true)]
async fn clean_run_parks_in_payment_and_reports_history() {
    let page = MockTicketPage::new().build();
    let handle = session(&page, Arc::new(InMemoryRunStateStore::new())).spawn();

    assert_eq!(handle.status(), RunStatus::Parked(StateId::Idle));
    handle.start(RunConfig::with_seats(1)).await.unwrap();
    assert_eq!(handle.wait_until_parked().await.unwrap(), StateId::Payment);

    let report = handle.get_state().await.unwrap();
    assert_eq!(report.current, StateId::Payment);
    assert_eq!(report.previous, Some(StateId::Confirm));
    assert_eq!(report.context.selected_seats.len(), 1);
    assert!(!report.history.is_empty());
    assert!(report.history.len() <= 10);
    assert_eq!(report.history.last().map(|record| record.to), Some(StateId::Payment));
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_run_and_clears_the_flag() {
    let page = MockTicketPage::new().captcha(true).build();
    let store = Arc::new(InMemoryRunStateStore::new());
    let handle = session(&page, Arc::clone(&store)).spawn();

    handle.start(RunConfig::with_seats(2)).await.unwrap();
    wait_for(&handle, StateId::HandleCaptcha).await;
    assert_eq!(handle.status(), RunStatus::Running);
    assert!(store.peek().unwrap().running);
    assert!(page.overlay("sword-captcha").is_some());

    assert_eq!(handle.stop().await.unwrap(), StateId::Idle);
    assert_eq!(handle.status(), RunStatus::Parked(StateId::Idle));
    let persisted = store.peek().unwrap();
    assert!(!persisted.running);
    assert_eq!(persisted.config.map(|config| config.seat_count), Some(2));
    assert!(page.overlay("sword-captcha").is_none());

    let report = handle.get_state().await.unwrap();
    assert_eq!(report.current, StateId::Idle);
    assert_eq!(report.previous, Some(StateId::HandleCaptcha));
}

#[tokio::test(start_paused = true)]
async fn start_after_failure_forces_a_restart() {
    let page = SimulatedPage::new(MOCK_URL);
    let mut session = session(&page, Arc::new(InMemoryRunStateStore::new()));
    let services = session.services().clone();

    session.start(RunConfig::default()).await.unwrap();
    assert_eq!(session.wait().await, StateId::Failed);
    assert!(page.overlay("sword-failure").is_some());

    session.start(RunConfig::default()).await.unwrap();
    assert_eq!(events_named(&services, "FORCE_RESTART"), 1);
    assert_eq!(session.wait().await, StateId::Failed);
}

#[tokio::test(start_paused = true)]
async fn reset_leaves_the_persisted_flag_alone() {
    let page = MockTicketPage::new().captcha(true).build();
    let store = Arc::new(InMemoryRunStateStore::new());
    let handle = session(&page, Arc::clone(&store)).spawn();

    handle.start(RunConfig::default()).await.unwrap();
    wait_for(&handle, StateId::HandleCaptcha).await;
    assert_eq!(handle.reset().await.unwrap(), StateId::Idle);
    assert!(store.peek().unwrap().running);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected() {
    let page = MockTicketPage::new().build();
    let handle = session(&page, Arc::new(InMemoryRunStateStore::new())).spawn();

    let err = handle.start(RunConfig::with_seats(0)).await.unwrap_err();
    assert!(matches!(err, SessionError::Flow(FlowError::Config(_))));
    assert_eq!(handle.status(), RunStatus::Parked(StateId::Idle));
}

#[tokio::test(start_paused = true)]
async fn diagnostics_overlay_toggles() {
    let page = MockTicketPage::new().build();
    let handle = session(&page, Arc::new(InMemoryRunStateStore::new())).spawn();

    assert!(handle.toggle_diagnostics_overlay().await.unwrap());
    let overlay = page.overlay(DIAGNOSTICS_OVERLAY_ID).expect("overlay shown");
    assert!(overlay.lines.iter().any(|line| line == "State: IDLE"));

    assert!(!handle.toggle_diagnostics_overlay().await.unwrap());
    assert!(page.overlay(DIAGNOSTICS_OVERLAY_ID).is_none());
}

#[tokio::test(start_paused = true)]
async fn resume_restarts_a_run_left_active() {
    let page = MockTicketPage::new().build();
    let store = Arc::new(InMemoryRunStateStore::new());
    store
        .save(&PersistedRun::running(RunConfig::with_seats(1)))
        .await
        .unwrap();

    let mut session = session(&page, Arc::clone(&store));
    assert!(session.resume_if_needed().await.unwrap());
    assert_eq!(session.wait().await, StateId::Payment);
    assert!(!store.peek().unwrap().running);
}

#[tokio::test(start_paused = true)]
async fn resume_is_skipped_without_a_running_flag() {
    let page = MockTicketPage::new().build();
    let store = Arc::new(InMemoryRunStateStore::new());
    store
        .save(&PersistedRun::stopped(Some(RunConfig::default())))
        .await
        .unwrap();

    let mut session = session(&page, Arc::clone(&store));
    let services = session.services().clone();
    assert!(!session.resume_if_needed().await.unwrap());
    assert_eq!(session.status(), RunStatus::Parked(StateId::Idle));
    assert_eq!(events_named(&services, "AUTO_RESUME_SKIPPED"), 1);
}
