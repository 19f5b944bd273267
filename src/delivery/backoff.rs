//! Reconnect pacing: exponential delay, capped, reset on success.

use std::time::Duration;

/// Tracks reconnect backoff and how many consecutive attempts have failed.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            current: initial,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn mark_failure(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Reset after a successful connect.
    pub fn mark_success(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.mark_failure(), Duration::from_millis(100));
        assert_eq!(backoff.mark_failure(), Duration::from_millis(200));
        assert_eq!(backoff.mark_failure(), Duration::from_millis(350));
        assert_eq!(backoff.mark_failure(), Duration::from_millis(350));
        assert_eq!(backoff.failures(), 4);
    }

    #[test]
    fn test_success_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
        backoff.mark_failure();
        backoff.mark_failure();
        backoff.mark_success();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.mark_failure(), Duration::from_millis(10));
    }

    #[test]
    fn test_zero_initial_is_clamped() {
        let mut backoff = Backoff::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(backoff.mark_failure(), Duration::from_millis(1));
    }
}
