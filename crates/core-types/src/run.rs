use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ErrorKind, StateId};

/// User configuration handed over with the start command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Booking opening time, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time: Option<i64>,
    #[serde(default = "default_seat_count")]
    pub seat_count: u32,
    #[serde(default)]
    pub auto_refresh: bool,
}

fn default_seat_count() -> u32 {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_time: None,
            seat_count: default_seat_count(),
            auto_refresh: false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("seat count must be at least 1")]
    NoSeats,
    #[error("seat count {0} exceeds the supported maximum of {max}", max = RunConfig::MAX_SEATS)]
    TooManySeats(u32),
}

impl RunConfig {
    pub const MAX_SEATS: u32 = 8;

    pub fn with_seats(seat_count: u32) -> Self {
        Self {
            seat_count,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seat_count == 0 {
            return Err(ConfigError::NoSeats);
        }
        if self.seat_count > Self::MAX_SEATS {
            return Err(ConfigError::TooManySeats(self.seat_count));
        }
        Ok(())
    }

    /// Milliseconds until the target time, if one is set and still ahead of `now_ms`.
    pub fn remaining_ms(&self, now_ms: i64) -> Option<i64> {
        self.target_time
            .map(|target| target - now_ms)
            .filter(|remaining| *remaining > 0)
    }
}

/// A seat picked (or attempted) on the seat map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRef {
    pub id: String,
    pub row: String,
    pub position: i64,
}

/// Error log entry kept in the run context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateId>,
    pub timestamp: DateTime<Utc>,
}

/// Serializable view of the run context for supervisors and telemetry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub retry_count: u32,
    pub error_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RunConfig>,
    pub selected_seats: Vec<SeatRef>,
    pub unavailable_seats: Vec<String>,
    pub popups_handled: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RecordedError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_seat_count() {
        assert!(RunConfig::with_seats(1).validate().is_ok());
        assert_eq!(RunConfig::with_seats(0).validate(), Err(ConfigError::NoSeats));
        assert_eq!(
            RunConfig::with_seats(9).validate(),
            Err(ConfigError::TooManySeats(9))
        );
    }

    #[test]
    fn parses_supervisor_payload() {
        let config: RunConfig =
            serde_json::from_str(r#"{"targetTime": 1700000000000, "seatCount": 2, "autoRefresh": true}"#)
                .unwrap();
        assert_eq!(config.target_time, Some(1_700_000_000_000));
        assert_eq!(config.seat_count, 2);
        assert!(config.auto_refresh);

        let defaults: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, RunConfig::default());
    }

    #[test]
    fn remaining_only_when_ahead() {
        let config = RunConfig {
            target_time: Some(10_000),
            ..RunConfig::default()
        };
        assert_eq!(config.remaining_ms(4_000), Some(6_000));
        assert_eq!(config.remaining_ms(10_000), None);
        assert_eq!(RunConfig::default().remaining_ms(0), None);
    }
}
