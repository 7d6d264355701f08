//! Exponential backoff with jitter for retrying external calls.
//!
//! Shared by the directions, geocoding and model retries so a struggling maps API sees a
//! widening gap between attempts instead of a burst.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    max: Duration,
    current: Duration,
    attempts: u32,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            max,
            current: base,
            attempts: 0,
            jitter_ratio: 0.2,
        }
    }

    /// Failures recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failure and return how long to wait before the next try.
    pub fn fail(&mut self) -> Duration {
        let delay = if self.attempts == 0 {
            self.current
        } else {
            self.current = self.current.saturating_mul(2).min(self.max);
            self.current
        };
        self.attempts += 1;
        add_jitter(delay, self.jitter_ratio)
    }

    /// Like [`fail`](Self::fail) but never shorter than a server-provided hint.
    pub fn fail_with_hint(&mut self, hint: Option<Duration>) -> Duration {
        let delay = self.fail();
        match hint {
            Some(hint) => delay.max(hint.min(self.max)),
            None => delay,
        }
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if !(0.0..=1.0).contains(&ratio) {
        return delay;
    }

    let delay_ms = delay.as_millis() as u64;
    let jitter_ms_max = ((delay_ms as f64) * ratio) as u64;
    if jitter_ms_max == 0 {
        return delay;
    }

    let jitter_ms = rand::rng().random_range(0..=jitter_ms_max);
    delay + Duration::from_millis(jitter_ms)
}
