use std::cmp;
use std::time::Duration;

/// Exponential delay between lock retries
#[derive(Debug, Clone)]
pub struct Backoff {
    cap: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, cap: Duration) -> Self {
        let initial = cmp::max(initial, Duration::from_millis(1));
        let cap = cmp::max(cap, initial);
        Self {
            cap,
            current: initial,
            attempts: 0,
        }
    }

    /// Returns the current delay and doubles it up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = cmp::min(self.current.saturating_mul(2), self.cap);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
