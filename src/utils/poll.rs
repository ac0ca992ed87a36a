//! Deadline-bounded polling used by the waiting steps.

use std::time::{Duration, Instant};

/// Tracks one fixed-interval polling loop.
///
/// The caller checks its condition, then calls [`Poller::tick`]; `tick`
/// sleeps and reports whether another attempt fits before the deadline.
pub struct Poller {
    deadline: Instant,
    interval: Duration,
}

impl Poller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            interval,
        }
    }

    /// Sleep until the next attempt; `false` once the deadline has passed
    pub async fn tick(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let remaining = self.deadline - now;
        tokio::time::sleep(self.interval.min(remaining)).await;
        true
    }
}
