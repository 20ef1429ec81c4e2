#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sword_action_flow::{handlers, Fsm, FlowServices, HandlerCx, Next, StateHandler};
use sword_action_primitives::simulated::SimulatedPage;
use sword_action_primitives::Environment;
use sword_core_types::{AutomationError, StateId};
use sword_event_bus::SupervisorEvent;
use sword_site_config::defaults::mocktest;
use sword_site_config::SiteConfig;
use tokio::sync::broadcast;

pub fn engine(page: &SimulatedPage) -> Fsm {
    engine_with(page, FlowServices::in_memory())
}

pub fn engine_with(page: &SimulatedPage, services: FlowServices) -> Fsm {
    build(page, mocktest(), services)
}

pub fn engine_for(page: &SimulatedPage, site: SiteConfig) -> Fsm {
    build(page, site, FlowServices::in_memory())
}

fn build(page: &SimulatedPage, site: SiteConfig, services: FlowServices) -> Fsm {
    let env = Environment::new(Arc::new(page.clone()));
    Fsm::new(env, Arc::new(site), services)
        .with_standard_handlers()
        .expect("standard handlers register once")
}

/// How many times `event` reached the run log.
pub fn logged(fsm: &Fsm, event: &str) -> usize {
    fsm.services()
        .run_log
        .all()
        .iter()
        .filter(|record| record.event == event)
        .count()
}

pub fn drain(rx: &mut broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn entries(fsm: &Fsm, state: StateId) -> usize {
    fsm.history().iter().filter(|record| record.to == state).count()
}

pub type Trace = Arc<Mutex<Vec<String>>>;

/// Wraps a handler and appends `enter:<state>` / `exit:<state>` to a trace.
pub struct Traced {
    inner: Box<dyn StateHandler>,
    trace: Trace,
}

impl Traced {
    pub fn all(trace: &Trace) -> Vec<Box<dyn StateHandler>> {
        handlers::standard()
            .into_iter()
            .map(|inner| {
                Box::new(Traced {
                    inner,
                    trace: Arc::clone(trace),
                }) as Box<dyn StateHandler>
            })
            .collect()
    }
}

#[async_trait]
impl StateHandler for Traced {
    fn id(&self) -> StateId {
        self.inner.id()
    }

    fn allowed(&self) -> &'static [StateId] {
        self.inner.allowed()
    }

    fn can_transition(&self, target: StateId) -> bool {
        self.inner.can_transition(target)
    }

    async fn on_enter(&mut self, cx: &mut HandlerCx<'_>, data: &Value) -> Result<(), AutomationError> {
        self.trace.lock().push(format!("enter:{}", self.inner.id()));
        self.inner.on_enter(cx, data).await
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        self.inner.execute(cx).await
    }

    fn auto_execute(&self) -> bool {
        self.inner.auto_execute()
    }

    async fn on_exit(&mut self, cx: &mut HandlerCx<'_>) {
        self.trace.lock().push(format!("exit:{}", self.inner.id()));
        self.inner.on_exit(cx).await;
    }
}

/// Stand-in handler returning a fixed outcome.
pub struct Stub {
    pub id: StateId,
    pub allowed: &'static [StateId],
    pub next: Option<Next>,
    pub auto: bool,
}

impl Stub {
    pub fn parked(id: StateId, allowed: &'static [StateId]) -> Self {
        Self {
            id,
            allowed,
            next: None,
            auto: false,
        }
    }

    pub fn forwarding(id: StateId, allowed: &'static [StateId], next: Next) -> Self {
        Self {
            id,
            allowed,
            next: Some(next),
            auto: true,
        }
    }
}

#[async_trait]
impl StateHandler for Stub {
    fn id(&self) -> StateId {
        self.id
    }

    fn allowed(&self) -> &'static [StateId] {
        self.allowed
    }

    async fn execute(&mut self, _cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        Ok(self.next.clone())
    }

    fn auto_execute(&self) -> bool {
        self.auto
    }
}
