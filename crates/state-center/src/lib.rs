//! Run-scoped state that outlives a single handler: telemetry fan-out, the
//! queryable run log, and the persisted "was running" flag used to resume
//! after an unexpected page reload.

mod ring;
mod run_log;
mod run_state;
mod telemetry;

pub use run_log::{LogFilter, RunLog, RunLogStats, DEFAULT_RUN_LOG_CAPACITY};
pub use run_state::{
    FileRunStateStore, InMemoryRunStateStore, PersistedRun, RunStateStore, StoreError,
};
pub use telemetry::{LogLevel, NoopSink, TelemetryHub, TelemetryRecord, TelemetrySink, TracingSink};
