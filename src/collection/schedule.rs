//! Tick schedule and loop errors.

use std::time::Duration;

use thiserror::Error;

/// Minimum allowed interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default tick interval (5 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Errors that can occur while starting or stopping the loop.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// Scheduler error.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Fixed interval between ticks.
///
/// Interval is clamped to a minimum of 1 second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule(Duration);

impl Schedule {
    /// Create an interval schedule.
    pub fn interval(duration: Duration) -> Self {
        if duration < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL,
                "Interval duration is less than minimum allowed. Using minimum duration."
            );
            Self(MIN_INTERVAL)
        } else {
            Self(duration)
        }
    }

    pub fn period(&self) -> Duration {
        self.0
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self(DEFAULT_INTERVAL)
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "every {:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_clamped() {
        assert_eq!(
            Schedule::interval(Duration::from_millis(200)).period(),
            MIN_INTERVAL
        );
        assert_eq!(
            Schedule::interval(Duration::from_secs(30)).period(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_default_and_display() {
        assert_eq!(Schedule::default().period(), DEFAULT_INTERVAL);
        assert_eq!(Schedule::default().to_string(), "every 5s");
    }
}
