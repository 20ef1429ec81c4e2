//! Supervisor command surface
//!
//! A supervisor (the CLI, a test, a UI) never touches the engine directly.
//! It sends [`SupervisorCommand`]s to the session task through a
//! [`SupervisorHandle`] and listens to [`SupervisorEvent`]s on the bus.

use std::sync::Arc;

use serde::Serialize;
use sword_action_flow::{FlowError, StateReport};
use sword_core_types::{RunConfig, StateId};
use sword_event_bus::{EventBus, SupervisorEvent};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("Automation session has shut down")]
    Closed,
}

/// Whether a run is being driven right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "state", rename_all = "kebab-case")]
pub enum RunStatus {
    Running,
    /// No handler is executing; the engine rests in this state.
    Parked(StateId),
}

pub enum SupervisorCommand {
    Start {
        config: RunConfig,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<StateId>,
    },
    Reset {
        reply: oneshot::Sender<StateId>,
    },
    GetState {
        reply: oneshot::Sender<StateReport>,
    },
    ToggleDiagnosticsOverlay {
        reply: oneshot::Sender<bool>,
    },
}

impl SupervisorCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SupervisorCommand::Start { .. } => "start",
            SupervisorCommand::Stop { .. } => "stop",
            SupervisorCommand::Reset { .. } => "reset",
            SupervisorCommand::GetState { .. } => "get-state",
            SupervisorCommand::ToggleDiagnosticsOverlay { .. } => "toggle-diagnostics-overlay",
        }
    }
}

/// Cloneable client for a running [`crate::AutomationSession`].
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<SupervisorCommand>,
    events: Arc<dyn EventBus<SupervisorEvent>>,
    status: watch::Receiver<RunStatus>,
}

impl SupervisorHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SupervisorCommand>,
        events: Arc<dyn EventBus<SupervisorEvent>>,
        status: watch::Receiver<RunStatus>,
    ) -> Self {
        Self {
            commands,
            events,
            status,
        }
    }

    /// Begin a run. A run already in progress is stopped first.
    pub async fn start(&self, config: RunConfig) -> Result<(), SessionError> {
        self.request(|reply| SupervisorCommand::Start { config, reply })
            .await?
    }

    /// Cancel the active run and clear the persisted running flag.
    pub async fn stop(&self) -> Result<StateId, SessionError> {
        self.request(|reply| SupervisorCommand::Stop { reply }).await
    }

    pub async fn reset(&self) -> Result<StateId, SessionError> {
        self.request(|reply| SupervisorCommand::Reset { reply }).await
    }

    pub async fn get_state(&self) -> Result<StateReport, SessionError> {
        self.request(|reply| SupervisorCommand::GetState { reply })
            .await
    }

    /// Returns whether the overlay is now on.
    pub async fn toggle_diagnostics_overlay(&self) -> Result<bool, SessionError> {
        self.request(|reply| SupervisorCommand::ToggleDiagnosticsOverlay { reply })
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Resolves with the resting state once no run is being driven.
    pub async fn wait_until_parked(&self) -> Result<StateId, SessionError> {
        let mut status = self.status.clone();
        loop {
            if let RunStatus::Parked(state) = *status.borrow_and_update() {
                return Ok(state);
            }
            status.changed().await.map_err(|_| SessionError::Closed)?;
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SupervisorCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }
}
