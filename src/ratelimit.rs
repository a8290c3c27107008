//! Token-bucket throttle for the hosted generation backend.
//!
//! The bucket holds at most `capacity` tokens (the service's per-minute
//! quota) and refills continuously at `capacity / 60` tokens per second.
//! After each call that reports usage, [`TokenBucket::consume`] refills the
//! bucket for the elapsed time and, if it holds fewer tokens than the call
//! consumed, sleeps for the deficit at the refill rate and starts over from a
//! full bucket:
//!
//! ```text
//! wait = max(0, used - bucket) * 60 / capacity   seconds
//! ```

use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A full bucket sized for `tokens_per_minute`.
    pub fn per_minute(tokens_per_minute: u64) -> Self {
        Self::starting_at(tokens_per_minute, Instant::now())
    }

    pub(crate) fn starting_at(tokens_per_minute: u64, now: Instant) -> Self {
        let capacity = tokens_per_minute.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            tokens: capacity,
            last: now,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }

    /// Account for `used` tokens spent at `now` and return how long the
    /// caller must wait before the next call.
    ///
    /// The bucket's clock advances past the returned wait, so time spent
    /// sleeping is not credited twice.
    pub fn settle(&mut self, used: u64, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        let used = used as f64;
        let mut wait = Duration::ZERO;
        if self.tokens < used {
            wait = Duration::from_secs_f64((used - self.tokens) / self.refill_per_sec);
            self.tokens = self.capacity;
        }
        self.tokens = (self.tokens - used).max(0.0);
        self.last = now + wait;
        wait
    }

    /// Record usage and block for whatever throttle it requires.
    pub async fn consume(&mut self, used: u64) {
        let wait = self.settle(used, Instant::now());
        if wait.is_zero() {
            debug!(used, remaining = self.tokens, "Token bucket has headroom");
        } else {
            info!(used, wait_secs = wait.as_secs_f64(), "Rate limit reached; waiting");
            sleep(wait).await;
        }
    }
}
