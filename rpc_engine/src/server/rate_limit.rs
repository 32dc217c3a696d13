use std::time::Instant;

use parking_lot::Mutex;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_per_sec: f64) -> bool {
        self.refill(capacity, refill_per_sec);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, capacity: f64, refill_per_sec: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.last_refill = now;
        let refill = elapsed.as_secs_f64() * refill_per_sec;
        self.tokens = (self.tokens + refill).min(capacity);
    }
}

/// Sustained rate plus burst capacity of the admission gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub rate_per_sec: f64,
    pub burst: u32,
}

impl RateLimitConfig {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate_per_sec,
            burst,
        }
    }
}

/// Single token bucket shared by every connection of a server.
///
/// The bucket starts full. A burst of zero admits nothing; an infinite rate
/// admits everything.
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
    unlimited: bool,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst);
        Self {
            unlimited: config.rate_per_sec == f64::INFINITY,
            bucket: Mutex::new(TokenBucket::new(capacity)),
            config,
        }
    }

    pub fn allow(&self) -> bool {
        if self.unlimited {
            return true;
        }

        let refill_per_sec = self.config.rate_per_sec.max(0.0);
        self.bucket
            .lock()
            .try_acquire(self.capacity(), refill_per_sec)
    }

    pub fn capacity(&self) -> f64 {
        f64::from(self.config.burst)
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }
}
