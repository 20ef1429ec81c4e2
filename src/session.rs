//! Automation session
//!
//! Owns one engine bound to one page and serializes every supervisor
//! command against it. Runs are driven on their own task so that `stop`
//! and `get_state` stay responsive while a handler is waiting on the page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sword_action_flow::{
    diagnostics_overlay, FlowError, FlowServices, Fsm, FsmView, StateReport,
    DIAGNOSTICS_OVERLAY_ID,
};
use sword_action_primitives::Environment;
use sword_core_types::{RunConfig, StateId};
use sword_event_bus::{EventBus, SupervisorEvent};
use sword_site_config::SiteConfig;
use sword_state_center::PersistedRun;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::supervisor::{RunStatus, SessionError, SupervisorCommand, SupervisorHandle};

const COMMAND_QUEUE: usize = 32;

/// Pause before an automatic resume so the reloaded page can settle.
pub const RESUME_SETTLE: Duration = Duration::from_millis(1_000);

/// URL fragments that mean the page is already inside a booking flow.
const BOOKING_URL_MARKERS: &[&str] = &["/section/", "/booking/", "/step", "perfCode"];

pub fn is_booking_page(url: &str) -> bool {
    BOOKING_URL_MARKERS.iter().any(|marker| url.contains(marker))
}

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct AutomationSession {
    fsm: Arc<Mutex<Fsm>>,
    view: FsmView,
    diagnostics: Arc<AtomicBool>,
    env: Environment,
    services: FlowServices,
    status: Arc<watch::Sender<RunStatus>>,
    active: Option<ActiveRun>,
}

impl AutomationSession {
    /// Session over an engine with the standard handlers.
    pub fn new(
        env: Environment,
        site: Arc<SiteConfig>,
        services: FlowServices,
    ) -> Result<Self, FlowError> {
        let fsm = Fsm::new(env, site, services).with_standard_handlers()?;
        Ok(Self::from_fsm(fsm))
    }

    pub fn from_fsm(fsm: Fsm) -> Self {
        let (status, _) = watch::channel(RunStatus::Parked(fsm.current()));
        Self {
            view: fsm.view(),
            diagnostics: fsm.diagnostics_flag(),
            env: fsm.env().clone(),
            services: fsm.services().clone(),
            fsm: Arc::new(Mutex::new(fsm)),
            status: Arc::new(status),
            active: None,
        }
    }

    pub fn services(&self) -> &FlowServices {
        &self.services
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Subscribe before starting to see every event of the run.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.services.events.subscribe()
    }

    /// Move the session onto its own task and hand back the client.
    pub fn spawn(self) -> SupervisorHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let handle = SupervisorHandle::new(
            tx,
            Arc::clone(&self.services.events),
            self.status.subscribe(),
        );
        tokio::spawn(self.serve(rx));
        handle
    }

    async fn serve(mut self, mut commands: mpsc::Receiver<SupervisorCommand>) {
        while let Some(command) = commands.recv().await {
            debug!(command = command.name(), "supervisor command");
            self.dispatch(command).await;
        }
        debug!("supervisor channel closed");
        self.halt().await;
    }

    async fn dispatch(&mut self, command: SupervisorCommand) {
        match command {
            SupervisorCommand::Start { config, reply } => {
                let _ = reply.send(self.start(config).await);
            }
            SupervisorCommand::Stop { reply } => {
                let _ = reply.send(self.stop().await);
            }
            SupervisorCommand::Reset { reply } => {
                let _ = reply.send(self.reset().await);
            }
            SupervisorCommand::GetState { reply } => {
                let _ = reply.send(self.state());
            }
            SupervisorCommand::ToggleDiagnosticsOverlay { reply } => {
                let _ = reply.send(self.toggle_diagnostics_overlay().await);
            }
        }
    }

    /// Begin a run on a background task. A run still in flight is
    /// cancelled and the engine is reset first.
    pub async fn start(&mut self, config: RunConfig) -> Result<(), SessionError> {
        config.validate().map_err(FlowError::from)?;
        self.services.telemetry.info("START_AUTOMATION", json!(config));
        self.cancel_active().await;

        let mut fsm = Arc::clone(&self.fsm).lock_owned().await;
        if fsm.current() != StateId::Idle {
            info!(from = %fsm.current(), "forcing restart");
            self.services
                .telemetry
                .info("FORCE_RESTART", json!({ "from": fsm.current() }));
            fsm.reset().await;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let status = Arc::clone(&self.status);
        status.send_replace(RunStatus::Running);
        let task = tokio::spawn(async move {
            let parked = match fsm.start(config, token).await {
                Ok(state) => state,
                Err(err) => {
                    warn!(error = %err, "run rejected");
                    fsm.current()
                }
            };
            info!(state = %parked, "run parked");
            status.send_replace(RunStatus::Parked(parked));
        });
        self.active = Some(ActiveRun { cancel, task });
        Ok(())
    }

    /// Cancel the run, forget the running flag, and park in IDLE.
    pub async fn stop(&mut self) -> StateId {
        info!("stop requested");
        self.services.telemetry.info("STOP_AUTOMATION", json!({}));
        let state = self.halt().await;
        let config = self.fsm.lock().await.context().config().cloned();
        if let Err(err) = self
            .services
            .run_state
            .save(&PersistedRun::stopped(config))
            .await
        {
            warn!(error = %err, "failed to clear running flag");
        }
        state
    }

    /// Cancel the run and park in IDLE; the persisted flag is left alone.
    pub async fn reset(&mut self) -> StateId {
        info!("reset requested");
        self.halt().await
    }

    pub fn state(&self) -> StateReport {
        self.view.read().clone()
    }

    /// Flip the diagnostics overlay. Returns whether it is now on.
    pub async fn toggle_diagnostics_overlay(&self) -> bool {
        let enabled = !self.diagnostics.fetch_xor(true, Ordering::SeqCst);
        let shown = if enabled {
            let overlay = diagnostics_overlay(&self.view.read());
            self.env.show_overlay(&overlay).await
        } else {
            self.env.clear_overlay(DIAGNOSTICS_OVERLAY_ID).await
        };
        if let Err(err) = shown {
            debug!(error = %err, "diagnostics overlay not updated");
        }
        self.services
            .telemetry
            .info("DIAGNOSTICS_OVERLAY", json!({ "enabled": enabled }));
        enabled
    }

    /// Restart a run after the page was reloaded under it.
    ///
    /// A stored config is required; it is reused when the running flag is
    /// still set or the page is already inside a booking flow. Returns
    /// whether a run was started.
    pub async fn resume_if_needed(&mut self) -> Result<bool, SessionError> {
        let persisted = match self.services.run_state.load().await {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!(error = %err, "run state unreadable; not resuming");
                self.services
                    .telemetry
                    .error("AUTO_RESUME_ERROR", json!({ "error": err.to_string() }));
                return Ok(false);
            }
        };
        let url = self.env.current_url().await.unwrap_or_default();
        let booking_page = is_booking_page(&url);
        let running = persisted.as_ref().map_or(false, |run| run.running);
        let config = persisted.and_then(|run| run.config);
        self.services.telemetry.info(
            "CHECK_AUTO_RESUME",
            json!({
                "isRunning": running,
                "hasConfig": config.is_some(),
                "isBookingPage": booking_page,
            }),
        );

        let Some(config) = config.filter(|_| running || booking_page) else {
            self.services.telemetry.info(
                "AUTO_RESUME_SKIPPED",
                json!({ "reason": "no running state or booking context" }),
            );
            return Ok(false);
        };

        let reason = if running { "flag" } else { "url_context" };
        info!(%url, reason, "resuming automation");
        self.services
            .telemetry
            .info("AUTO_RESUME_DETECTED", json!({ "url": url, "reason": reason }));
        tokio::time::sleep(RESUME_SETTLE).await;
        self.start(config).await?;
        Ok(true)
    }

    /// Wait for the active run, if any, to park.
    pub async fn wait(&mut self) -> StateId {
        if let Some(active) = self.active.take() {
            if let Err(err) = active.task.await {
                warn!(error = %err, "run task ended abnormally");
            }
        }
        self.fsm.lock().await.current()
    }

    async fn cancel_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(err) = active.task.await {
                warn!(error = %err, "run task ended abnormally");
            }
        }
    }

    async fn halt(&mut self) -> StateId {
        self.cancel_active().await;
        let mut fsm = self.fsm.lock().await;
        if fsm.current() != StateId::Idle {
            fsm.reset().await;
        }
        let state = fsm.current();
        self.status.send_replace(RunStatus::Parked(state));
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_page_markers() {
        assert!(is_booking_page("https://tickets.example/booking/123"));
        assert!(is_booking_page("https://tickets.example/app?perfCode=42"));
        assert!(is_booking_page("http://localhost/mock/step2"));
        assert!(!is_booking_page("https://tickets.example/goods/123"));
    }
}
