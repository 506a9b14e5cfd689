//! Per-client fixed window.

use std::time::Duration;

use tokio::time::Instant;

/// Request count within the current window of one client.
#[derive(Debug, Clone, Copy)]
pub struct ClientWindow {
    pub count: u32,
    pub started: Instant,
}

impl ClientWindow {
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            started: now,
        }
    }

    pub fn has_elapsed(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.started) >= window
    }

    /// Start over if the window has elapsed, then count the request if
    /// there is room. Returns whether it was counted.
    pub fn try_admit(&mut self, now: Instant, window: Duration, max_requests: u32) -> bool {
        if self.has_elapsed(now, window) {
            *self = Self::new(now);
        }
        if self.count >= max_requests {
            return false;
        }
        self.count += 1;
        true
    }

    /// Time until this window resets.
    pub fn remaining(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.started))
    }
}
