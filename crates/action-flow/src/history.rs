//! Bounded transition history

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sword_core_types::StateId;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// One accepted transition. Never mutated after it is recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: StateId,
    pub to: StateId,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    #[serde(default)]
    pub data: Value,
}

/// Most recent transitions; older entries fall off the front.
#[derive(Debug, Clone)]
pub struct History {
    capacity: usize,
    records: VecDeque<TransitionRecord>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: TransitionRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TransitionRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Visited states in order, starting from the first recorded origin.
    pub fn path(&self) -> Vec<StateId> {
        let mut path = Vec::with_capacity(self.records.len() + 1);
        if let Some(first) = self.records.front() {
            path.push(first.from);
        }
        path.extend(self.records.iter().map(|record| record.to));
        path
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: StateId, to: StateId) -> TransitionRecord {
        TransitionRecord {
            from,
            to,
            timestamp: Utc::now(),
            reason: String::new(),
            data: Value::Null,
        }
    }

    #[test]
    fn keeps_most_recent() {
        let mut history = History::new(3);
        history.push(record(StateId::Idle, StateId::ClickStart));
        history.push(record(StateId::ClickStart, StateId::SelectZone));
        history.push(record(StateId::SelectZone, StateId::SelectSeat));
        history.push(record(StateId::SelectSeat, StateId::Confirm));

        assert_eq!(history.len(), 3);
        assert_eq!(
            history.path(),
            vec![
                StateId::ClickStart,
                StateId::SelectZone,
                StateId::SelectSeat,
                StateId::Confirm
            ]
        );
        let recent = history.recent(2);
        assert_eq!(recent[0].to, StateId::SelectSeat);
        assert_eq!(recent[1].to, StateId::Confirm);
    }
}
