use std::time::Duration;
use tokio::time::Instant;

/// Token bucket where one token is one byte. Starts full.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: u64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate: f64, capacity: u64) -> Self {
        Self {
            rate,
            capacity,
            tokens: capacity as f64,
            last_refill: Instant::now(),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Check whether `amount` tokens are available without taking them.
    /// Returns how long to wait otherwise, saturating at `Duration::MAX` for
    /// rates too small to express. `amount` is clamped to the capacity.
    pub fn check(&mut self, amount: u64, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        let amount = amount.min(self.capacity) as f64;
        if self.tokens >= amount {
            Ok(())
        } else {
            let wait = (amount - self.tokens) / self.rate;
            Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
        }
    }

    pub fn consume(&mut self, amount: u64) {
        self.tokens -= amount as f64;
    }

    pub fn available(&mut self, now: Instant) -> u64 {
        self.refill(now);
        self.tokens.max(0.0) as u64
    }
}
