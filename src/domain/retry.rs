use std::time::Duration;

/// Delays applied after each failed balance update, in order.
pub const RETRY_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(5),
    Duration::from_secs(25),
    Duration::from_secs(125),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextDelay {
    After(Duration),
    Exhausted,
}

/// One scheduled retry: which slot of the schedule it is and how long to wait
/// before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    pub index: usize,
    pub delay: Duration,
}

/// Fixed, deterministic backoff policy.
///
/// The scheduler never sleeps itself; callers suspend for the returned delay
/// through whatever primitive their runtime provides.
#[derive(Debug, Clone, Copy)]
pub struct RetryScheduler {
    schedule: &'static [Duration],
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryScheduler {
    pub const fn new() -> Self {
        Self {
            schedule: &RETRY_SCHEDULE,
        }
    }

    pub fn next_delay(&self, attempt_index: usize) -> NextDelay {
        match self.attempt(attempt_index) {
            Some(attempt) => NextDelay::After(attempt.delay),
            None => NextDelay::Exhausted,
        }
    }

    pub fn attempt(&self, index: usize) -> Option<RetryAttempt> {
        self.schedule
            .get(index)
            .map(|&delay| RetryAttempt { index, delay })
    }

    /// Number of store attempts a single message gets.
    pub fn max_retries(&self) -> usize {
        self.schedule.len()
    }
}
