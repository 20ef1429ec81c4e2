use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::ring::BoundedRing;
use crate::telemetry::{LogLevel, TelemetryRecord, TelemetrySink};

pub const DEFAULT_RUN_LOG_CAPACITY: usize = 500;

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunLogStats {
    pub total: u64,
    pub debug: u64,
    pub info: u64,
    pub warn: u64,
    pub error: u64,
    pub evicted: u64,
}

/// Query over the run log. Empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct LogFilter {
    pub min_level: Option<LogLevel>,
    /// Substring of the event name.
    pub event: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl LogFilter {
    pub fn level(level: LogLevel) -> Self {
        Self {
            min_level: Some(level),
            ..Self::default()
        }
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    fn matches(&self, record: &TelemetryRecord) -> bool {
        if let Some(level) = self.min_level {
            if record.level < level {
                return false;
            }
        }
        if let Some(event) = &self.event {
            if !record.event.contains(event.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        true
    }
}

/// Bounded in-memory log of a run, queryable after the fact.
#[derive(Debug)]
pub struct RunLog {
    entries: Mutex<BoundedRing<TelemetryRecord>>,
    stats: Mutex<RunLogStats>,
}

impl RunLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(BoundedRing::new(capacity)),
            stats: Mutex::new(RunLogStats::default()),
        }
    }

    pub fn push(&self, record: TelemetryRecord) {
        let level = record.level;
        let evicted = self.entries.lock().push(record).is_some();
        let mut stats = self.stats.lock();
        stats.total += 1;
        match level {
            LogLevel::Debug => stats.debug += 1,
            LogLevel::Info => stats.info += 1,
            LogLevel::Warn => stats.warn += 1,
            LogLevel::Error => stats.error += 1,
        }
        if evicted {
            stats.evicted += 1;
        }
    }

    pub fn query(&self, filter: &LogFilter) -> Vec<TelemetryRecord> {
        self.entries
            .lock()
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<TelemetryRecord> {
        self.query(&LogFilter::default())
    }

    /// ERROR-level entries as JSON values, oldest first.
    pub fn error_tail(&self) -> Vec<Value> {
        self.query(&LogFilter::level(LogLevel::Error))
            .iter()
            .filter_map(|record| serde_json::to_value(record).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RunLogStats {
        self.stats.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        *self.stats.lock() = RunLogStats::default();
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.all())
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.all())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        writer.flush()
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_LOG_CAPACITY)
    }
}

impl TelemetrySink for RunLog {
    fn record(&self, record: &TelemetryRecord) {
        self.push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn entry(level: LogLevel, event: &str) -> TelemetryRecord {
        TelemetryRecord::new(level, event, json!({ "n": 1 }))
    }

    #[test]
    fn bounded_and_counted() {
        let log = RunLog::new(3);
        for index in 0..5 {
            log.push(entry(LogLevel::Info, &format!("E{index}")));
        }
        let events: Vec<_> = log.all().into_iter().map(|r| r.event).collect();
        assert_eq!(events, vec!["E2", "E3", "E4"]);
        let stats = log.stats();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.evicted, 2);
    }

    #[test]
    fn filters_by_level_and_event() {
        let log = RunLog::default();
        log.push(entry(LogLevel::Debug, "POPUP_DETECTED"));
        log.push(entry(LogLevel::Warn, "POPUP_LOOP_DETECTED"));
        log.push(entry(LogLevel::Error, "AUTOMATION_FAILED"));

        assert_eq!(log.query(&LogFilter::level(LogLevel::Warn)).len(), 2);
        assert_eq!(log.query(&LogFilter::default().event("POPUP")).len(), 2);
        assert_eq!(
            log.query(&LogFilter::level(LogLevel::Warn).event("POPUP")).len(),
            1
        );
        assert_eq!(log.error_tail().len(), 1);
    }

    #[test]
    fn exports_pretty_json() {
        let log = RunLog::default();
        log.push(entry(LogLevel::Info, "FSM_STARTED"));
        let exported = log.export_json().unwrap();
        assert!(exported.contains("\"FSM_STARTED\""));
        assert!(exported.contains("\"INFO\""));

        let file = NamedTempFile::new().expect("tempfile");
        log.write_to(file.path()).expect("write log");
        let written = std::fs::read_to_string(file.path()).expect("read log");
        let parsed: Vec<TelemetryRecord> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
