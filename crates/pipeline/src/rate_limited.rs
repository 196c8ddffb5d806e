//! Rate-limited warnings for hot-path failures
//!
//! Queue-full drops and forward failures can happen thousands of times a
//! second under overload. Each logger emits at most one line per interval
//! and reports how many occurrences it swallowed in between.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between two emitted lines
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

pub struct RateLimitedLogger {
    interval: Duration,
    last: Mutex<Option<Instant>>,
    pending: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Occurrences recorded since creation
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Record one occurrence; returns whether a line was emitted
    pub fn warn(&self, pipe: &str, message: &str, error: &dyn Display) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.due() {
            return false;
        }
        let occurrences = self.pending.swap(0, Ordering::Relaxed);
        if occurrences > 1 {
            tracing::warn!(
                pipe,
                error = %error,
                suppressed = occurrences - 1,
                total,
                "{message}"
            );
        } else {
            tracing::warn!(pipe, error = %error, total, "{message}");
        }
        true
    }

    fn due(&self) -> bool {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_logged() {
        let logger = RateLimitedLogger::new(Duration::from_secs(60));
        assert!(logger.warn("p", "dropped", &"full"));
        assert!(!logger.warn("p", "dropped", &"full"));
        assert!(!logger.warn("p", "dropped", &"full"));
        assert_eq!(logger.total(), 3);
    }

    #[test]
    fn test_logs_again_after_interval() {
        let logger = RateLimitedLogger::new(Duration::from_millis(10));
        assert!(logger.warn("p", "dropped", &"full"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(logger.warn("p", "dropped", &"full"));
    }
}
