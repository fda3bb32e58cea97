/// Consecutive failed authentication attempts.
///
/// The count stays within `0..threshold` between calls: the failure that
/// reaches the threshold fires escalation and clears the count in the same
/// step.
#[derive(Debug, Clone)]
pub struct AttemptState {
    count: u32,
    threshold: u32,
}

/// What one recorded failure amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    /// 1-based attempt number this failure represented.
    pub attempt: u32,
    /// The threshold was reached; the count is back to 0.
    pub escalate: bool,
}

impl AttemptState {
    /// A threshold of 0 is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn record_failure(&mut self) -> Failure {
        self.count += 1;
        let attempt = self.count;
        let escalate = self.count >= self.threshold;
        if escalate {
            self.count = 0;
        }
        Failure { attempt, escalate }
    }
}
