use crate::domain::ports::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Wall-clock time source for live trading. `sleep` defers to
/// `tokio::time::sleep` so it cooperates with the runtime's timer wheel
/// rather than blocking a worker thread.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn next_boundary(&self, period: Duration) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::from_std(period).unwrap_or(chrono::Duration::zero())
    }
}

/// Time source for historical replay: `now()` is whatever timestamp the
/// harness last fed it via [`ReplayClock::advance`], and `sleep` returns
/// immediately rather than waiting on the wall clock. This is what lets
/// a backtest cover months of history in seconds while every cycle still
/// sees a plausible, monotonically increasing timestamp.
pub struct ReplayClock {
    current: Mutex<DateTime<Utc>>,
}

impl ReplayClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Advance the replay clock to `timestamp`. Panics if `timestamp` is
    /// before the current position — replay must move forward only.
    pub fn advance(&self, timestamp: DateTime<Utc>) {
        let mut guard = self.current.lock().expect("replay clock mutex poisoned");
        assert!(
            timestamp >= *guard,
            "replay clock moved backward: {timestamp} < {}",
            *guard
        );
        *guard = timestamp;
    }
}

#[async_trait]
impl Clock for ReplayClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().expect("replay clock mutex poisoned")
    }

    async fn sleep(&self, _duration: Duration) {
        // Replay advances via explicit `advance()` calls, not wall time.
    }

    fn next_boundary(&self, period: Duration) -> DateTime<Utc> {
        self.now() + chrono::Duration::from_std(period).unwrap_or(chrono::Duration::zero())
    }
}
