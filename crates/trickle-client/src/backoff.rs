//! Reconnect delays.

use std::time::Duration;

/// Shortest delay ever used, so a misconfigured policy cannot spin.
const MIN_DELAY: Duration = Duration::from_millis(100);

/// Exponential backoff with a cap: `initial`, `2 * initial`, ... up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
}

impl ReconnectPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_DELAY);
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before the retry that follows `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 1_u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub const fn initial(&self) -> Duration {
        self.initial
    }

    pub const fn max(&self) -> Duration {
        self.max
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..7).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn huge_failure_counts_stay_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(31), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn zero_initial_delay_is_raised() {
        let policy = ReconnectPolicy::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.delay(0), MIN_DELAY);
        assert_eq!(policy.max(), MIN_DELAY);
    }
}
