//! Liveness Monitor.
//!
//! A periodic check with period equal to the ping timeout. Pings only move
//! the last-ping timestamp; each tick compares elapsed time against the
//! timeout, so a silent client is noticed within two periods.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug)]
pub struct LivenessMonitor {
    last_ping: Instant,
    timeout: Duration,
    ticker: Interval,
}

impl LivenessMonitor {
    /// Start monitoring now. The first check runs one timeout from now.
    pub fn start(timeout: Duration) -> Self {
        let now = Instant::now();
        let mut ticker = interval_at(now + timeout, timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            last_ping: now,
            timeout,
            ticker,
        }
    }

    pub fn record_ping(&mut self) {
        self.last_ping = Instant::now();
    }

    pub fn last_ping(&self) -> Instant {
        self.last_ping
    }

    /// Whether the client has been silent for at least the timeout.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_ping) >= self.timeout
    }

    /// Wait for the next periodic check.
    pub async fn tick(&mut self) -> Instant {
        self.ticker.tick().await
    }
}
