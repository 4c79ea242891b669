use std::time::Duration;

/// Waits before each extraction attempt, in order. One attempt per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    waits: Vec<Duration>,
}

impl RetrySchedule {
    pub fn new(waits: Vec<Duration>) -> Self {
        Self { waits }
    }

    /// `attempts` waits starting at `first` and growing by `step` each time.
    pub fn linear(first: Duration, step: Duration, attempts: usize) -> Self {
        let waits = (0..attempts)
            .map(|attempt| first.saturating_add(step.saturating_mul(attempt as u32)))
            .collect();
        Self { waits }
    }

    pub fn attempts(&self) -> usize {
        self.waits.len()
    }

    /// Wait before the zero-based `attempt`, or `None` once the schedule is spent.
    pub fn delay(&self, attempt: usize) -> Option<Duration> {
        self.waits.get(attempt).copied()
    }

    pub fn waits(&self) -> &[Duration] {
        &self.waits
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::linear(Duration::from_secs(3), Duration::from_secs(1), 4)
    }
}
