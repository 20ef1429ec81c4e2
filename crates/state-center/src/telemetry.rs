use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// One structured telemetry entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl TelemetryRecord {
    pub fn new(level: LogLevel, event: impl Into<String>, data: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            event: event.into(),
            data,
        }
    }
}

/// Destination for telemetry. Recording never fails from the caller's view.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: &TelemetryRecord);
}

/// Forwards records to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, record: &TelemetryRecord) {
        let event = record.event.as_str();
        let data = &record.data;
        match record.level {
            LogLevel::Debug => tracing::debug!(target: "sword::telemetry", event, %data),
            LogLevel::Info => tracing::info!(target: "sword::telemetry", event, %data),
            LogLevel::Warn => tracing::warn!(target: "sword::telemetry", event, %data),
            LogLevel::Error => tracing::error!(target: "sword::telemetry", event, %data),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record(&self, _record: &TelemetryRecord) {}
}

/// Fans records out to every registered sink and to live subscribers.
pub struct TelemetryHub {
    min_level: RwLock<LogLevel>,
    sinks: RwLock<Vec<Arc<dyn TelemetrySink>>>,
    sender: broadcast::Sender<TelemetryRecord>,
}

impl TelemetryHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            min_level: RwLock::new(LogLevel::Debug),
            sinks: RwLock::new(Vec::new()),
            sender,
        }
    }

    pub fn with_sink(self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.register(sink);
        self
    }

    pub fn register(&self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.write().push(sink);
    }

    pub fn set_min_level(&self, level: LogLevel) {
        *self.min_level.write() = level;
    }

    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryRecord> {
        self.sender.subscribe()
    }

    pub fn record(&self, level: LogLevel, event: &str, data: Value) {
        if level < self.min_level() {
            return;
        }
        let record = TelemetryRecord::new(level, event, data);
        let sinks = self.sinks.read().clone();
        for sink in sinks {
            sink.record(&record);
        }
        let _ = self.sender.send(record);
    }

    pub fn debug(&self, event: &str, data: Value) {
        self.record(LogLevel::Debug, event, data);
    }

    pub fn info(&self, event: &str, data: Value) {
        self.record(LogLevel::Info, event, data);
    }

    pub fn warn(&self, event: &str, data: Value) {
        self.record(LogLevel::Warn, event, data);
    }

    pub fn error(&self, event: &str, data: Value) {
        self.record(LogLevel::Error, event, data);
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for TelemetryHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryHub")
            .field("min_level", &self.min_level())
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}
