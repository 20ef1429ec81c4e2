//! Recovery engine: maps a failure kind to a bounded recovery action

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sword_action_primitives::ActionError;
use sword_core_types::{AutomationError, ErrorKind, StateId};
use sword_event_bus::SupervisorEvent;
use tracing::{info, warn};

use crate::handler::HandlerCx;

/// What the ERROR state does after recovery ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Re-enter the state that failed.
    Retry,
    /// The recovery action picked where to continue.
    Resume(StateId),
    /// Budget exhausted, unknown kind, or the action itself failed.
    Fallback(StateId),
}

impl RecoveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryOutcome::Retry => "retry",
            RecoveryOutcome::Resume(_) => "resume",
            RecoveryOutcome::Fallback(_) => "fallback",
        }
    }
}

/// One named policy of the recovery table.
///
/// Strategies keep no state of their own; anything they change goes
/// through the run context.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn kind(&self) -> ErrorKind;

    /// Recoveries allowed for this kind within one run.
    fn ceiling(&self) -> u32;

    fn fallback(&self) -> StateId {
        StateId::Failed
    }

    /// Side-effecting adjustment. `attempt` counts earlier recoveries of the
    /// same kind. `Some(state)` overrides the default retry.
    async fn recover(
        &self,
        error: &AutomationError,
        attempt: u32,
        cx: &mut HandlerCx<'_>,
    ) -> Result<Option<StateId>, ActionError>;
}

pub struct RecoveryEngine {
    strategies: BTreeMap<ErrorKind, Arc<dyn RecoveryStrategy>>,
}

impl RecoveryEngine {
    pub fn empty() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// The built-in table: one strategy per classified error kind.
    pub fn standard() -> Self {
        let mut engine = Self::empty();
        engine.register(Arc::new(NetworkTimeout));
        engine.register(Arc::new(ElementNotFound));
        engine.register(Arc::new(SeatConflict));
        engine.register(Arc::new(PopupLoop));
        engine.register(Arc::new(PageReload));
        engine.register(Arc::new(CaptchaFailed));
        engine.register(Arc::new(ButtonDisabled));
        engine
    }

    /// Later registrations replace earlier ones for the same kind.
    pub fn register(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn strategy(&self, kind: ErrorKind) -> Option<&Arc<dyn RecoveryStrategy>> {
        self.strategies.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ErrorKind> + '_ {
        self.strategies.keys().copied()
    }

    /// Decide how to continue after `error`.
    ///
    /// Only cancellation surfaces as `Err`; every other failure of the
    /// recovery action becomes a fallback to FAILED.
    pub async fn handle(
        &self,
        error: &AutomationError,
        cx: &mut HandlerCx<'_>,
    ) -> Result<RecoveryOutcome, ActionError> {
        let Some(strategy) = self.strategies.get(&error.kind) else {
            cx.error(
                "UNRECOVERABLE_ERROR",
                json!({ "kind": error.kind, "message": error.message }),
            );
            return Ok(RecoveryOutcome::Fallback(StateId::Failed));
        };

        let prior = cx.context.record_attempt(error.kind);
        if prior >= strategy.ceiling() {
            cx.warn(
                "MAX_RETRIES_EXCEEDED",
                json!({
                    "kind": error.kind,
                    "ceiling": strategy.ceiling(),
                    "fallback": strategy.fallback(),
                }),
            );
            return Ok(RecoveryOutcome::Fallback(strategy.fallback()));
        }

        info!(kind = %error.kind, attempt = prior + 1, "running recovery");
        match strategy.recover(error, prior, cx).await {
            Ok(None) => Ok(RecoveryOutcome::Retry),
            Ok(Some(state)) => Ok(RecoveryOutcome::Resume(state)),
            Err(err) if err.is_interrupted() => Err(err),
            Err(err) => {
                warn!(kind = %error.kind, error = %err, "recovery action failed");
                cx.error(
                    "RECOVERY_FAILED",
                    json!({ "kind": error.kind, "error": err.to_string() }),
                );
                Ok(RecoveryOutcome::Fallback(StateId::Failed))
            }
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::standard()
    }
}

fn backoff(base_ms: u64, factor: f64, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    Duration::from_secs_f64(base_ms as f64 / 1000.0 * factor.powi(exponent))
}

struct NetworkTimeout;

#[async_trait]
impl RecoveryStrategy for NetworkTimeout {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NetworkTimeout
    }

    fn ceiling(&self) -> u32 {
        3
    }

    async fn recover(
        &self,
        _error: &AutomationError,
        attempt: u32,
        cx: &mut HandlerCx<'_>,
    ) -> Result<Option<StateId>, ActionError> {
        cx.env.sleep(backoff(1_000, 1.5, attempt)).await?;
        cx.env.reload().await?;
        Ok(None)
    }
}

struct ElementNotFound;

#[async_trait]
impl RecoveryStrategy for ElementNotFound {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ElementNotFound
    }

    fn ceiling(&self) -> u32 {
        5
    }

    async fn recover(
        &self,
        _error: &AutomationError,
        attempt: u32,
        cx: &mut HandlerCx<'_>,
    ) -> Result<Option<StateId>, ActionError> {
        cx.env.sleep(backoff(500, 1.2, attempt)).await?;
        cx.env.scroll_page(0.5).await?;
        cx.env.sleep(Duration::from_millis(500)).await?;
        Ok(None)
    }
}

struct SeatConflict;

#[async_trait]
impl RecoveryStrategy for SeatConflict {
    fn kind(&self) -> ErrorKind {
        ErrorKind::SeatConflict
    }

    fn ceiling(&self) -> u32 {
        10
    }

    async fn recover(
        &self,
        error: &AutomationError,
        _attempt: u32,
        cx: &mut HandlerCx<'_>,
    ) -> Result<Option<StateId>, ActionError> {
        cx.env.sleep(Duration::from_millis(100)).await?;
        if let Some(seat) = &error.meta.seat {
            cx.context.mark_unavailable(seat);
        }
        Ok(None)
    }
}

struct PopupLoop;

#[async_trait]
impl RecoveryStrategy for PopupLoop {
    fn kind(&self) -> ErrorKind {
        ErrorKind::PopupLoop
    }

    fn ceiling(&self) -> u32 {
        3
    }

    fn fallback(&self) -> StateId {
        StateId::SelectZone
    }

    async fn recover(
        &self,
        error: &AutomationError,
        _attempt: u32,
        cx: &mut HandlerCx<'_>,
    ) -> Result<Option<StateId>, ActionError> {
        if let Some(popup) = &error.meta.popup {
            cx.env.remove(popup).await?;
            cx.info("POPUP_FORCE_REMOVED", json!({ "popup": popup }));
        }
        cx.env.sleep(Duration::from_millis(500)).await?;
        Ok(None)
    }
}

struct PageReload;

#[async_trait]
impl RecoveryStrategy for PageReload {
    fn kind(&self) -> ErrorKind {
        ErrorKind::PageReload
    }

    fn ceiling(&self) -> u32 {
        2
    }

    async fn recover(
        &self,
        _error: &AutomationError,
        _attempt: u32,
        cx: &mut HandlerCx<'_>,
    ) -> Result<Option<StateId>, ActionError> {
        cx.env.wait_for_page_load(cx.site.timing.page_load_timeout()).await?;
        let seat_page = !cx.site.markers.seat_url.is_empty()
            && cx.env.url_contains(&cx.site.markers.seat_url).await?;
        Ok(Some(if seat_page {
            StateId::SelectZone
        } else {
            StateId::ClickStart
        }))
    }
}

struct CaptchaFailed;

#[async_trait]
impl RecoveryStrategy for CaptchaFailed {
    fn kind(&self) -> ErrorKind {
        ErrorKind::CaptchaFailed
    }

    fn ceiling(&self) -> u32 {
        1
    }

    async fn recover(
        &self,
        error: &AutomationError,
        _attempt: u32,
        cx: &mut HandlerCx<'_>,
    ) -> Result<Option<StateId>, ActionError> {
        cx.emit(SupervisorEvent::ManualActionRequired {
            action: "SOLVE_CAPTCHA".to_string(),
            message: format!("CAPTCHA still pending: {}", error.message),
        })
        .await;
        Ok(Some(StateId::HandleCaptcha))
    }
}

struct ButtonDisabled;

#[async_trait]
impl RecoveryStrategy for ButtonDisabled {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ButtonDisabled
    }

    fn ceiling(&self) -> u32 {
        5
    }

    async fn recover(
        &self,
        _error: &AutomationError,
        attempt: u32,
        cx: &mut HandlerCx<'_>,
    ) -> Result<Option<StateId>, ActionError> {
        cx.env.sleep(backoff(500, 1.3, attempt)).await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::handler::FlowServices;
    use sword_action_primitives::simulated::{SimElement, SimulatedPage};
    use sword_action_primitives::Environment;
    use sword_site_config::defaults::mocktest;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        page: SimulatedPage,
        env: Environment,
        site: sword_site_config::SiteConfig,
        services: FlowServices,
        context: RunContext,
    }

    impl Fixture {
        fn new(url: &str) -> Self {
            let page = SimulatedPage::new(url);
            Self {
                env: Environment::new(Arc::new(page.clone())),
                page,
                site: mocktest(),
                services: FlowServices::in_memory(),
                context: RunContext::default(),
            }
        }

        async fn handle(&mut self, engine: &RecoveryEngine, error: &AutomationError) -> RecoveryOutcome {
            let mut cx = HandlerCx {
                env: &self.env,
                site: &self.site,
                context: &mut self.context,
                services: &self.services,
                previous: Some(StateId::SelectSeat),
                state: StateId::Error,
            };
            engine.handle(error, &mut cx).await.unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_only_after_ceiling_is_spent() {
        let engine = RecoveryEngine::standard();
        for kind in engine.kinds().collect::<Vec<_>>() {
            let ceiling = engine.strategy(kind).unwrap().ceiling();
            let fallback = engine.strategy(kind).unwrap().fallback();
            let mut fixture = Fixture::new("http://localhost:8080/mock-ticket-page/seat");
            let error = AutomationError::recoverable(kind, "again");
            for occurrence in 1..=ceiling {
                let outcome = fixture.handle(&engine, &error).await;
                assert!(
                    !matches!(outcome, RecoveryOutcome::Fallback(_)),
                    "{kind} fell back on occurrence {occurrence}"
                );
            }
            assert_eq!(
                fixture.handle(&engine, &error).await,
                RecoveryOutcome::Fallback(fallback),
                "{kind}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_kind_is_fatal() {
        let engine = RecoveryEngine::standard();
        let mut fixture = Fixture::new("http://localhost/");
        let error = AutomationError::recoverable(ErrorKind::Unknown, "mystery");
        assert_eq!(
            fixture.handle(&engine, &error).await,
            RecoveryOutcome::Fallback(StateId::Failed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn seat_conflict_marks_the_seat() {
        let engine = RecoveryEngine::standard();
        let mut fixture = Fixture::new("http://localhost/");
        let error = AutomationError::recoverable(ErrorKind::SeatConflict, "taken").with_seat("C-4");
        assert_eq!(fixture.handle(&engine, &error).await, RecoveryOutcome::Retry);
        assert!(fixture.context.is_unavailable("C-4"));
    }

    #[tokio::test(start_paused = true)]
    async fn popup_loop_removes_the_popup() {
        let engine = RecoveryEngine::standard();
        let mut fixture = Fixture::new("http://localhost/");
        let popup = fixture.page.append(SimElement::new("div").class("popup"));
        let error = AutomationError::recoverable(ErrorKind::PopupLoop, "same popup").with_popup(popup);
        assert_eq!(fixture.handle(&engine, &error).await, RecoveryOutcome::Retry);
        assert!(fixture.page.first(".popup").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn page_reload_resumes_by_url() {
        let engine = RecoveryEngine::standard();
        let error = AutomationError::recoverable(ErrorKind::PageReload, "navigated");

        let mut on_seats = Fixture::new("http://localhost:8080/mock-ticket-page/seat");
        assert_eq!(
            on_seats.handle(&engine, &error).await,
            RecoveryOutcome::Resume(StateId::SelectZone)
        );

        let mut elsewhere = Fixture::new("http://localhost:8080/mock-ticket-page/index.html");
        assert_eq!(
            elsewhere.handle(&engine, &error).await,
            RecoveryOutcome::Resume(StateId::ClickStart)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn network_timeout_reloads() {
        let engine = RecoveryEngine::standard();
        let mut fixture = Fixture::new("http://localhost/");
        let error = AutomationError::recoverable(ErrorKind::NetworkTimeout, "slow");
        assert_eq!(fixture.handle(&engine, &error).await, RecoveryOutcome::Retry);
        assert_eq!(fixture.page.reloads(), 1);
    }

    #[tokio::test]
    async fn captcha_failure_asks_for_help() {
        let engine = RecoveryEngine::standard();
        let mut fixture = Fixture::new("http://localhost/");
        let mut events = fixture.services.events.subscribe();
        let error = AutomationError::recoverable(ErrorKind::CaptchaFailed, "timed out");
        assert_eq!(
            fixture.handle(&engine, &error).await,
            RecoveryOutcome::Resume(StateId::HandleCaptcha)
        );
        let event = events.try_recv().unwrap();
        assert_eq!(event.name(), "manual-action-required");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_recovery_is_reported() {
        let engine = RecoveryEngine::standard();
        let mut fixture = Fixture::new("http://localhost/");
        let token = CancellationToken::new();
        fixture.env = fixture.env.with_cancel(token.clone());
        token.cancel();
        let error = AutomationError::recoverable(ErrorKind::ButtonDisabled, "disabled");
        let mut cx = HandlerCx {
            env: &fixture.env,
            site: &fixture.site,
            context: &mut fixture.context,
            services: &fixture.services,
            previous: Some(StateId::Confirm),
            state: StateId::Error,
        };
        assert!(engine.handle(&error, &mut cx).await.unwrap_err().is_interrupted());
    }

    #[test]
    fn backoff_grows_geometrically() {
        assert_eq!(backoff(500, 1.2, 0), Duration::from_millis(500));
        assert_eq!(backoff(1_000, 1.5, 2), Duration::from_millis(2_250));
    }
}
