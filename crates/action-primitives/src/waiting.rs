//! Progressive polling used by the environment's waits

use std::time::Duration;

/// Poll gaps growing from fast to slow, then staying at the last step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    steps_ms: Vec<u64>,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            steps_ms: vec![100, 300, 500, 1000, 2000],
        }
    }
}

impl PollSchedule {
    pub fn new(steps_ms: Vec<u64>) -> Self {
        if steps_ms.is_empty() {
            return Self::default();
        }
        Self { steps_ms }
    }

    /// Fixed-interval schedule.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            steps_ms: vec![interval.as_millis().max(1) as u64],
        }
    }

    /// Gap before poll number `attempt` (zero-based), clamped to `remaining`.
    pub fn gap(&self, attempt: usize, remaining: Duration) -> Duration {
        let step = self
            .steps_ms
            .get(attempt)
            .or_else(|| self.steps_ms.last())
            .copied()
            .unwrap_or(100);
        Duration::from_millis(step).min(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_grow_then_hold() {
        let schedule = PollSchedule::default();
        let plenty = Duration::from_secs(60);
        let gaps: Vec<u64> = (0..7)
            .map(|attempt| schedule.gap(attempt, plenty).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![100, 300, 500, 1000, 2000, 2000, 2000]);
    }

    #[test]
    fn gap_never_exceeds_remaining_time() {
        let schedule = PollSchedule::default();
        assert_eq!(
            schedule.gap(4, Duration::from_millis(250)),
            Duration::from_millis(250)
        );
    }
}
