//! State handler contract and the per-call context handed to handlers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sword_action_primitives::{ActionError, Environment, Overlay};
use sword_core_types::{AutomationError, StateId};
use sword_event_bus::{EventBus, InMemoryBus, SupervisorEvent};
use sword_site_config::SiteConfig;
use sword_state_center::{
    InMemoryRunStateStore, LogLevel, PersistedRun, RunLog, RunStateStore, TelemetryHub,
    TracingSink, DEFAULT_RUN_LOG_CAPACITY,
};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::RunContext;

/// Where a handler wants the engine to go next.
#[derive(Debug, Clone, PartialEq)]
pub struct Next {
    pub to: StateId,
    pub reason: String,
    pub data: Value,
}

impl Next {
    pub fn to(to: StateId, reason: impl Into<String>) -> Self {
        Self {
            to,
            reason: reason.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// One phase of the purchase flow.
///
/// The engine calls `on_enter`, then `execute` when the handler
/// auto-executes, and `on_exit` before the next state's `on_enter`.
/// Anything started in `on_enter` must be torn down in `on_exit`.
#[async_trait]
pub trait StateHandler: Send + Sync {
    fn id(&self) -> StateId;

    /// Successors this state may hand over to, ERROR excluded.
    fn allowed(&self) -> &'static [StateId];

    fn can_transition(&self, target: StateId) -> bool {
        target == StateId::Error || self.allowed().contains(&target)
    }

    async fn on_enter(&mut self, _cx: &mut HandlerCx<'_>, _data: &Value) -> Result<(), AutomationError> {
        Ok(())
    }

    /// Forward-progress loop. `Ok(None)` parks the engine in this state.
    async fn execute(&mut self, _cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        Ok(None)
    }

    /// Whether the engine runs `execute` right after `on_enter`.
    fn auto_execute(&self) -> bool {
        true
    }

    async fn on_exit(&mut self, _cx: &mut HandlerCx<'_>) {}
}

/// Collaborators shared by the engine, the handlers and the session.
#[derive(Clone)]
pub struct FlowServices {
    pub telemetry: Arc<TelemetryHub>,
    pub events: Arc<dyn EventBus<SupervisorEvent>>,
    pub run_state: Arc<dyn RunStateStore>,
    pub run_log: Arc<RunLog>,
}

impl FlowServices {
    pub fn new(
        telemetry: Arc<TelemetryHub>,
        events: Arc<dyn EventBus<SupervisorEvent>>,
        run_state: Arc<dyn RunStateStore>,
        run_log: Arc<RunLog>,
    ) -> Self {
        Self {
            telemetry,
            events,
            run_state,
            run_log,
        }
    }

    /// Everything in memory; telemetry goes to the run log and to `tracing`.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryRunStateStore::new()))
    }

    pub fn with_store(run_state: Arc<dyn RunStateStore>) -> Self {
        let run_log = Arc::new(RunLog::new(DEFAULT_RUN_LOG_CAPACITY));
        let telemetry = TelemetryHub::default()
            .with_sink(run_log.clone())
            .with_sink(Arc::new(TracingSink));
        let events: Arc<dyn EventBus<SupervisorEvent>> = InMemoryBus::new(256);
        Self::new(Arc::new(telemetry), events, run_state, run_log)
    }
}

/// Borrowed view of the engine handed to a handler for one call.
pub struct HandlerCx<'a> {
    pub env: &'a Environment,
    pub site: &'a SiteConfig,
    pub context: &'a mut RunContext,
    pub services: &'a FlowServices,
    /// State active before the current one.
    pub previous: Option<StateId>,
    pub state: StateId,
}

impl<'a> HandlerCx<'a> {
    pub fn log(&self, level: LogLevel, event: &str, data: Value) {
        self.services.telemetry.record(level, event, data);
    }

    pub fn debug(&self, event: &str, data: Value) {
        self.log(LogLevel::Debug, event, data);
    }

    pub fn info(&self, event: &str, data: Value) {
        self.log(LogLevel::Info, event, data);
    }

    pub fn warn(&self, event: &str, data: Value) {
        self.log(LogLevel::Warn, event, data);
    }

    pub fn error(&self, event: &str, data: Value) {
        self.log(LogLevel::Error, event, data);
    }

    /// Publish to the supervisor; having nobody listening is fine.
    pub async fn emit(&self, event: SupervisorEvent) {
        let name = event.name();
        if self.services.events.publish(event).await.is_err() {
            debug!(event = name, "no supervisor listening");
        }
    }

    pub async fn persist(&self, run: PersistedRun) {
        if let Err(err) = self.services.run_state.save(&run).await {
            warn!(error = %err, running = run.running, "failed to persist run state");
            self.warn("RUN_STATE_PERSIST_FAILED", json!({ "error": err.to_string() }));
        }
    }

    /// Render a cue on the page; a page that cannot draw it is not an error.
    pub async fn overlay(&self, overlay: &Overlay) {
        if let Err(err) = self.env.show_overlay(overlay).await {
            debug!(id = %overlay.id, error = %err, "overlay not shown");
        }
    }

    pub async fn clear_overlay(&self, id: &str) {
        if let Err(err) = self.env.clear_overlay(id).await {
            debug!(id, error = %err, "overlay not cleared");
        }
    }
}

/// Periodic tick bound to the lifetime of one state visit.
///
/// Created in `on_enter`, dropped in `on_exit`; dropping cancels it, and so
/// does cancelling the run it was derived from.
pub struct Subscription {
    token: CancellationToken,
    interval: Interval,
}

impl Subscription {
    pub fn every(period: Duration, parent: &CancellationToken) -> Self {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            token: parent.child_token(),
            interval,
        }
    }

    pub async fn tick(&mut self) -> Result<(), ActionError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ActionError::Interrupted("subscription cancelled".to_string())),
            _ = self.interval.tick() => Ok(()),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn subscription_ticks_until_cancelled() {
        let parent = CancellationToken::new();
        let mut ticker = Subscription::every(Duration::from_millis(100), &parent);
        let started = tokio::time::Instant::now();
        for _ in 0..3 {
            ticker.tick().await.unwrap();
        }
        assert_eq!(started.elapsed(), Duration::from_millis(200));

        parent.cancel();
        assert!(ticker.tick().await.unwrap_err().is_interrupted());
    }

    #[tokio::test]
    async fn dropping_cancels_only_the_child() {
        let parent = CancellationToken::new();
        let ticker = Subscription::every(Duration::from_millis(100), &parent);
        let child = ticker.token.clone();
        drop(ticker);
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn next_carries_data() {
        let next = Next::to(StateId::WaitOpen, "scheduled").with_data(json!({ "targetTime": 5 }));
        assert_eq!(next.to, StateId::WaitOpen);
        assert_eq!(next.data["targetTime"], 5);
    }
}
