//! Injectable timing.
//!
//! The session's ping cadence and the supervisor's reconnect backoff both
//! need to be driven by `tokio::time::sleep` in production and by a fake
//! clock in tests. `tokio::time::pause()`/`advance()` work on both as long
//! as the injected implementation actually calls `tokio::time::sleep`
//! rather than `std::thread::sleep`.

use std::time::Duration;

use async_trait::async_trait;

/// A sleep strategy for the reconnect loop's backoff delay.
#[async_trait]
pub trait Backoff: Send + Sync {
    /// Sleep for the delay appropriate to `consecutive_failures` (1-based).
    async fn wait(&self, consecutive_failures: u32);
}

/// `delay * consecutive_failures`, growing the wait with each failure.
pub struct LinearBackoff {
    pub delay: Duration,
}

impl LinearBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Backoff for LinearBackoff {
    async fn wait(&self, consecutive_failures: u32) {
        let factor = consecutive_failures.max(1);
        tokio::time::sleep(self.delay * factor).await;
    }
}

/// A ticker firing at a fixed interval, used to drive periodic pings.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick.
    async fn tick(&mut self);
}

/// A [`Ticker`] backed by `tokio::time::interval`.
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            interval: tokio::time::interval(period),
        }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
