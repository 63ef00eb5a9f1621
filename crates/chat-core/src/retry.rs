use std::time::Duration;

/// Exponential backoff for reconnect campaigns.
///
/// The policy itself is stateless; the attempt counter belongs to the
/// state machine and is handed in on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_attempts,
        }
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `min(base * 2^attempt, cap)`, saturating instead of overflowing.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }

    /// Attempt number for the next reconnect, or `None` once the budget is spent.
    pub fn next_attempt(&self, attempt: u32) -> Option<u32> {
        (attempt < self.max_attempts).then(|| attempt + 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1_000, 10_000, 5)
    }
}
