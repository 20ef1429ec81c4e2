//! The booking state machine
//!
//! [`Fsm`] owns the current state, the run context and the transition
//! history. Handlers never call back into the engine: they return the next
//! state (or an error) and the engine performs the transition, so the drive
//! loop is a flat trampoline with exactly one handler active at a time.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use sword_action_primitives::{Environment, Overlay, OverlayKind};
use sword_core_types::{AutomationError, ContextSnapshot, ErrorKind, RunConfig, StateId};
use sword_event_bus::SupervisorEvent;
use sword_site_config::SiteConfig;
use sword_state_center::PersistedRun;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::RunContext;
use crate::errors::FlowError;
use crate::handler::{FlowServices, HandlerCx, Next, StateHandler};
use crate::handlers;
use crate::history::{History, TransitionRecord};

/// Transitions included in a [`StateReport`].
pub const REPORT_HISTORY: usize = 10;

pub const DIAGNOSTICS_OVERLAY_ID: &str = "sword-diagnostics";

pub type TransitionListener = Box<dyn Fn(&TransitionRecord) -> anyhow::Result<()> + Send + Sync>;

/// Answer to a supervisor's state query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    pub current: StateId,
    pub previous: Option<StateId>,
    pub context: ContextSnapshot,
    pub history: Vec<TransitionRecord>,
}

impl StateReport {
    fn idle() -> Self {
        Self {
            current: StateId::Idle,
            previous: None,
            context: ContextSnapshot::default(),
            history: Vec::new(),
        }
    }
}

/// Latest report, readable while a run holds the engine.
pub type FsmView = Arc<RwLock<StateReport>>;

/// `State / Retries / Time` panel drawn when diagnostics are on.
pub fn diagnostics_overlay(report: &StateReport) -> Overlay {
    let seconds = report.context.elapsed_ms.unwrap_or(0) / 1_000;
    Overlay::new(DIAGNOSTICS_OVERLAY_ID, OverlayKind::Diagnostics, "sword")
        .line(format!("State: {}", report.current))
        .line(format!("Retries: {}", report.context.retry_count))
        .line(format!("Time: {seconds}s"))
}

macro_rules! handler_cx {
    ($fsm:ident, $state:expr) => {
        HandlerCx {
            env: &$fsm.run_env,
            site: &*$fsm.site,
            context: &mut $fsm.context,
            services: &$fsm.services,
            previous: $fsm.previous,
            state: $state,
        }
    };
}

pub struct Fsm {
    env: Environment,
    /// `env` bound to the cancellation token of the active run.
    run_env: Environment,
    site: Arc<SiteConfig>,
    services: FlowServices,
    handlers: BTreeMap<StateId, Box<dyn StateHandler>>,
    current: StateId,
    previous: Option<StateId>,
    context: RunContext,
    history: History,
    listeners: Vec<TransitionListener>,
    view: FsmView,
    diagnostics: Arc<AtomicBool>,
}

impl Fsm {
    /// Engine without handlers, parked in IDLE.
    pub fn new(env: Environment, site: Arc<SiteConfig>, services: FlowServices) -> Self {
        let mut context = RunContext::default();
        context.set_site(&site.name);
        Self {
            run_env: env.clone(),
            env,
            site,
            services,
            handlers: BTreeMap::new(),
            current: StateId::Idle,
            previous: None,
            context,
            history: History::default(),
            listeners: Vec::new(),
            view: Arc::new(RwLock::new(StateReport::idle())),
            diagnostics: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register the eleven built-in handlers.
    pub fn with_standard_handlers(mut self) -> Result<Self, FlowError> {
        for handler in handlers::standard() {
            self.register_state(handler)?;
        }
        Ok(self)
    }

    pub fn register_state(&mut self, handler: Box<dyn StateHandler>) -> Result<(), FlowError> {
        let id = handler.id();
        if self.handlers.contains_key(&id) {
            return Err(FlowError::DuplicateState(id));
        }
        debug!(state = %id, "handler registered");
        self.handlers.insert(id, handler);
        Ok(())
    }

    pub fn set_site(&mut self, site: Arc<SiteConfig>) {
        self.context.set_site(&site.name);
        self.site = site;
    }

    /// Listener errors and panics are logged and never reach the engine.
    pub fn on_transition<F>(&mut self, listener: F)
    where
        F: Fn(&TransitionRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn current(&self) -> StateId {
        self.current
    }

    pub fn previous(&self) -> Option<StateId> {
        self.previous
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn site(&self) -> &Arc<SiteConfig> {
        &self.site
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn services(&self) -> &FlowServices {
        &self.services
    }

    pub fn view(&self) -> FsmView {
        Arc::clone(&self.view)
    }

    pub fn diagnostics_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.diagnostics)
    }

    pub fn report(&self) -> StateReport {
        StateReport {
            current: self.current,
            previous: self.previous,
            context: self.context.snapshot(),
            history: self.history.recent(REPORT_HISTORY),
        }
    }

    /// Begin a run from IDLE and drive it until it parks.
    ///
    /// Returns the state the run stopped in: PAYMENT, FAILED, or IDLE when
    /// `cancel` fired.
    pub async fn start(
        &mut self,
        config: RunConfig,
        cancel: CancellationToken,
    ) -> Result<StateId, FlowError> {
        config.validate()?;
        if self.current != StateId::Idle {
            return Err(FlowError::Busy(self.current));
        }
        if !self.handlers.contains_key(&StateId::Idle) {
            return Err(FlowError::UnknownState(StateId::Idle));
        }

        self.run_env = self.env.with_cancel(cancel);
        self.context.begin(config.clone(), &self.site.name);
        if let Err(err) = self.services.run_state.save(&PersistedRun::running(config.clone())).await {
            warn!(error = %err, "failed to persist running flag");
        }
        info!(
            run_id = %self.context.run_id(),
            site = %self.site.name,
            seats = config.seat_count,
            "automation started"
        );
        self.services.telemetry.info(
            "AUTOMATION_STARTED",
            json!({ "config": config, "site": self.site.name }),
        );
        self.publish_view();

        let first = self.execute_current().await;
        self.drive(first).await;
        Ok(self.current)
    }

    /// Externally requested transition. `Ok(false)` when the current state
    /// does not allow `to`; nothing changes in that case.
    pub async fn transition(
        &mut self,
        to: StateId,
        data: Value,
        reason: &str,
    ) -> Result<bool, FlowError> {
        if !self.handlers.contains_key(&to) {
            return Err(FlowError::UnknownState(to));
        }
        let from = self.current;
        let allowed = self
            .handlers
            .get(&from)
            .ok_or(FlowError::UnknownState(from))?
            .can_transition(to);
        if !allowed {
            self.blocked(from, to, reason);
            return Ok(false);
        }
        let outcome = self.enter(to, data, reason).await;
        self.drive(outcome).await;
        Ok(true)
    }

    /// Log the error and route it through ERROR.
    pub async fn handle_error(&mut self, error: AutomationError) {
        if let Some(outcome) = self.route_error(error).await {
            self.drive(outcome).await;
        }
    }

    /// Back to IDLE with a cleared context; the configuration survives.
    pub async fn reset(&mut self) {
        self.reset_with("reset").await;
    }

    async fn reset_with(&mut self, reason: &str) {
        let from = self.current;
        self.context.reset();
        // Teardown hooks run outside the cancelled run.
        self.run_env = self.env.clone();
        if from != StateId::Idle && self.handlers.contains_key(&StateId::Idle) {
            if let Err(err) = self.enter(StateId::Idle, Value::Null, reason).await {
                warn!(error = %err, "IDLE rejected reset");
            }
        }
        self.services
            .telemetry
            .info("FSM_RESET", json!({ "from": from, "reason": reason }));
        self.publish_view();
    }

    async fn drive(&mut self, mut outcome: Result<Option<Next>, AutomationError>) {
        loop {
            if self.run_env.is_cancelled() {
                info!(state = %self.current, "run cancelled");
                self.reset_with("cancelled").await;
                return;
            }
            outcome = match outcome {
                Ok(None) => return,
                Ok(Some(next)) => self.advance(next).await,
                Err(error) => match self.route_error(error).await {
                    Some(outcome) => outcome,
                    None => return,
                },
            };
        }
    }

    /// Handler-requested transition.
    async fn advance(&mut self, next: Next) -> Result<Option<Next>, AutomationError> {
        let from = self.current;
        let allowed = self
            .handlers
            .get(&from)
            .map_or(false, |handler| handler.can_transition(next.to));
        if !allowed {
            self.blocked(from, next.to, &next.reason);
            return Err(AutomationError::fatal(
                ErrorKind::Unknown,
                format!("transition {from} -> {} is not allowed", next.to),
            ));
        }
        self.enter(next.to, next.data, &next.reason).await
    }

    /// exit(from) → record → swap → enter(to) → notify → execute(to).
    async fn enter(
        &mut self,
        to: StateId,
        data: Value,
        reason: &str,
    ) -> Result<Option<Next>, AutomationError> {
        if !self.handlers.contains_key(&to) {
            return Err(AutomationError::fatal(
                ErrorKind::Unknown,
                format!("no handler registered for {to}"),
            ));
        }
        let from = self.current;
        if let Some(handler) = self.handlers.get_mut(&from) {
            let mut cx = handler_cx!(self, from);
            handler.on_exit(&mut cx).await;
        }

        let record = TransitionRecord {
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
            data,
        };
        self.history.push(record.clone());
        info!(%from, %to, reason, "state transition");
        self.services.telemetry.info(
            "STATE_TRANSITION",
            json!({ "from": from, "to": to, "reason": reason }),
        );
        self.previous = Some(from);
        self.current = to;

        let entered = match self.handlers.get_mut(&to) {
            Some(handler) => {
                let mut cx = handler_cx!(self, to);
                handler.on_enter(&mut cx, &record.data).await
            }
            None => Ok(()),
        };
        self.notify(&record).await;
        entered?;

        let auto = self
            .handlers
            .get(&to)
            .map_or(false, |handler| handler.auto_execute());
        if !auto {
            return Ok(None);
        }
        self.execute_current().await
    }

    async fn execute_current(&mut self) -> Result<Option<Next>, AutomationError> {
        let state = self.current;
        let Some(handler) = self.handlers.get_mut(&state) else {
            return Err(AutomationError::fatal(
                ErrorKind::Unknown,
                format!("no handler registered for {state}"),
            ));
        };
        let mut cx = handler_cx!(self, state);
        handler.execute(&mut cx).await
    }

    /// `None` when the run cannot go anywhere from here.
    async fn route_error(
        &mut self,
        mut error: AutomationError,
    ) -> Option<Result<Option<Next>, AutomationError>> {
        let state = self.current;
        if error.meta.state.is_none() {
            error.meta.state = Some(state);
        }
        warn!(%state, kind = %error.kind, recoverable = error.recoverable, message = %error.message, "handler failed");
        self.services.telemetry.warn(
            "TRANSITION_ERROR",
            json!({ "state": state, "kind": error.kind, "message": error.message }),
        );

        match state {
            StateId::Failed => {
                error!(message = %error.message, "FAILED handler raised; run stays parked");
                None
            }
            StateId::Error => {
                // A failing ERROR state goes straight to FAILED, never back to ERROR.
                self.context.record_error(&error);
                if !self.handlers.contains_key(&StateId::Failed) {
                    error!("no FAILED handler registered; run stays parked");
                    return None;
                }
                let reason = format!("recovery failed: {}", error.message);
                let data = json!({ "reason": reason, "error": error });
                Some(self.enter(StateId::Failed, data, "error during recovery").await)
            }
            _ => {
                if !self.handlers.contains_key(&StateId::Error) {
                    error!("no ERROR handler registered; run stays parked");
                    return None;
                }
                self.context.record_error(&error);
                let reason = error.to_string();
                let data = json!({ "error": error, "recoverable": error.recoverable });
                Some(self.enter(StateId::Error, data, &reason).await)
            }
        }
    }

    fn blocked(&self, from: StateId, to: StateId, reason: &str) {
        warn!(%from, %to, reason, "transition blocked");
        self.services.telemetry.warn(
            "TRANSITION_BLOCKED",
            json!({ "from": from, "to": to, "reason": reason }),
        );
    }

    fn publish_view(&self) {
        *self.view.write() = self.report();
    }

    async fn notify(&self, record: &TransitionRecord) {
        self.publish_view();

        for listener in &self.listeners {
            let failure = match catch_unwind(AssertUnwindSafe(|| listener(record))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(_) => "listener panicked".to_string(),
            };
            warn!(error = %failure, "transition listener failed");
            self.services
                .telemetry
                .warn("EVENT_LISTENER_ERROR", json!({ "error": failure }));
        }

        let event = SupervisorEvent::StateChanged {
            from: record.from,
            to: record.to,
            reason: record.reason.clone(),
            context: self.context.snapshot(),
        };
        if self.services.events.publish(event).await.is_err() {
            debug!("no supervisor listening for state changes");
        }

        if self.diagnostics.load(Ordering::Relaxed) {
            let overlay = diagnostics_overlay(&self.view.read());
            if let Err(err) = self.run_env.show_overlay(&overlay).await {
                debug!(error = %err, "diagnostics overlay not shown");
            }
        }
    }
}
