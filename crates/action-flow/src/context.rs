//! Run context shared by the handlers of one automation run

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use sword_core_types::{
    AutomationError, ContextSnapshot, ErrorKind, RecordedError, RunConfig, RunId, SeatRef,
};
use tokio::time::Instant;

pub const ERROR_LOG_CAPACITY: usize = 50;

/// Mutable record of one run.
///
/// Owned by the engine; handlers and recovery strategies reach it only
/// through [`crate::HandlerCx`] while they are the active party.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    retry_count: u32,
    attempts: BTreeMap<ErrorKind, u32>,
    errors: VecDeque<RecordedError>,
    error_total: usize,
    start_time: Option<DateTime<Utc>>,
    started_at: Option<Instant>,
    config: Option<RunConfig>,
    selected_seats: Vec<SeatRef>,
    unavailable_seats: BTreeSet<String>,
    popups_handled: u32,
    site: Option<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            run_id: RunId::new(),
            retry_count: 0,
            attempts: BTreeMap::new(),
            errors: VecDeque::with_capacity(ERROR_LOG_CAPACITY),
            error_total: 0,
            start_time: None,
            started_at: None,
            config: None,
            selected_seats: Vec::new(),
            unavailable_seats: BTreeSet::new(),
            popups_handled: 0,
            site: None,
        }
    }
}

impl RunContext {
    /// Fresh run: new id, clock started, counters and seat data cleared.
    pub fn begin(&mut self, config: RunConfig, site: &str) {
        *self = Self {
            start_time: Some(Utc::now()),
            started_at: Some(Instant::now()),
            config: Some(config),
            site: Some(site.to_string()),
            ..Self::default()
        };
    }

    /// Clear everything but the configuration and the site.
    pub fn reset(&mut self) {
        let config = self.config.take();
        let site = self.site.take();
        *self = Self {
            config,
            site,
            ..Self::default()
        };
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn config(&self) -> Option<&RunConfig> {
        self.config.as_ref()
    }

    /// Requested seat count, one when no run is configured.
    pub fn seat_count(&self) -> u32 {
        self.config.as_ref().map_or(1, |config| config.seat_count)
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    pub fn set_site(&mut self, site: &str) {
        self.site = Some(site.to_string());
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn bump_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub fn attempts(&self, kind: ErrorKind) -> u32 {
        self.attempts.get(&kind).copied().unwrap_or(0)
    }

    /// Count one more recovery of `kind`; returns the count before this one.
    pub fn record_attempt(&mut self, kind: ErrorKind) -> u32 {
        let slot = self.attempts.entry(kind).or_insert(0);
        let prior = *slot;
        *slot += 1;
        prior
    }

    pub fn record_error(&mut self, error: &AutomationError) {
        if self.errors.len() == ERROR_LOG_CAPACITY {
            self.errors.pop_front();
        }
        self.errors.push_back(RecordedError {
            kind: error.kind,
            message: error.message.clone(),
            recoverable: error.recoverable,
            state: error.meta.state,
            timestamp: Utc::now(),
        });
        self.error_total += 1;
    }

    pub fn errors(&self) -> impl Iterator<Item = &RecordedError> {
        self.errors.iter()
    }

    pub fn error_total(&self) -> usize {
        self.error_total
    }

    pub fn last_error(&self) -> Option<&RecordedError> {
        self.errors.back()
    }

    /// Seats only ever join this set within a run.
    pub fn mark_unavailable(&mut self, seat_id: &str) -> bool {
        self.unavailable_seats.insert(seat_id.to_string())
    }

    pub fn is_unavailable(&self, seat_id: &str) -> bool {
        self.unavailable_seats.contains(seat_id)
    }

    pub fn unavailable_seats(&self) -> impl Iterator<Item = &str> {
        self.unavailable_seats.iter().map(String::as_str)
    }

    pub fn selected_seats(&self) -> &[SeatRef] {
        &self.selected_seats
    }

    pub fn set_selected(&mut self, seats: Vec<SeatRef>) {
        self.selected_seats = seats;
    }

    pub fn popups_handled(&self) -> u32 {
        self.popups_handled
    }

    pub fn note_popup(&mut self) -> u32 {
        self.popups_handled += 1;
        self.popups_handled
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.started_at
            .map(|started| i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX))
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            retry_count: self.retry_count,
            error_count: self.errors.len(),
            start_time: self.start_time,
            elapsed_ms: self.elapsed_ms(),
            config: self.config.clone(),
            selected_seats: self.selected_seats.clone(),
            unavailable_seats: self.unavailable_seats.iter().cloned().collect(),
            popups_handled: self.popups_handled,
            site: self.site.clone(),
            last_error: self.last_error().cloned(),
        }
    }
}
